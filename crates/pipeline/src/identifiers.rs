//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`CitationKey`] with a [`CommitSha`] even though both are strings under the
//! hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or only whitespace.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single run (one pass from provisioning through reporting).
///
/// Generated fresh for every run intent; propagated through spans and the run
/// report so all activity from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`RunId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (Git names, bibliography keys, URLs)
// ---------------------------------------------------------------------------

string_id! {
    /// A Git branch name (e.g. `"main"`).
    BranchName
}

string_id! {
    /// A Git remote name (e.g. `"origin"`).
    RemoteName
}

string_id! {
    /// A Git commit SHA as printed by `git rev-parse HEAD`.
    CommitSha
}

string_id! {
    /// A file-system path relative to the repository root.
    ///
    /// Identifies the bibliography file and the trigger watch-list entries.
    RepoPath
}

string_id! {
    /// The URL of a wiki page whose citations are harvested.
    WikiPageUrl
}

impl CommitSha {
    /// Returns the abbreviated (7 character) form used in reports.
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(7).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

/// A BibTeX citation key (the `key` in `@article{key, ...}`).
///
/// BibTeX treats keys case-insensitively, so equality and hashing are defined
/// on the lower-cased form while the original spelling is kept for output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationKey(String);

impl CitationKey {
    /// Creates a key, returning `None` if it is empty or contains characters
    /// BibTeX does not allow in keys (whitespace, `,`, `{`, `}`).
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        let v = v.trim();
        if v.is_empty()
            || v.chars()
                .any(|c| c.is_whitespace() || matches!(c, ',' | '{' | '}'))
        {
            None
        } else {
            Some(Self(v.to_string()))
        }
    }

    /// Returns the key as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for CitationKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for CitationKey {}

impl std::hash::Hash for CitationKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl std::fmt::Display for CitationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
