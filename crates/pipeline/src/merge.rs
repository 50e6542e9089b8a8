//! Merging fetched records into an existing bibliography.
//!
//! This is the only place bibliography content changes. It is pure: no
//! network, no file system, no git. Callers decide whether to persist the
//! result based on [`MergeOutcome::changed`].

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::bibliography::{Bibliography, Entry, FieldValue};
use crate::citations::{template_param, CitationKind, WikiCitation};
use crate::identifiers::CitationKey;

/// Fields compared against wiki citation text to detect existing references.
const MATCH_FIELDS: [&str; 5] = ["title", "author", "journal", "booktitle", "note"];

/// Generated titles are cut to this many characters.
const MAX_TITLE_CHARS: usize = 200;

/// Tag written into generated entries when none is configured.
pub const DEFAULT_SOURCE_TAG: &str = "source:wikiversity";

/// Everything fetched for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    /// Reference-manager entries, authoritative for their keys.
    pub references: Vec<Entry>,
    /// Citations harvested from wiki pages.
    pub citations: Vec<WikiCitation>,
}

impl RecordSet {
    /// Returns `true` if nothing was fetched.
    pub fn is_empty(&self) -> bool {
        self.references.is_empty() && self.citations.is_empty()
    }
}

/// Options that shape generated entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Value of the `tags` field on entries generated from wiki citations.
    pub source_tag: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { source_tag: DEFAULT_SOURCE_TAG.to_string() }
    }
}

/// Result of [`merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The merged bibliography.
    pub bibliography: Bibliography,
    /// Entries appended.
    pub added: usize,
    /// Entries replaced in place.
    pub updated: usize,
}

impl MergeOutcome {
    /// Returns `true` if the merged bibliography differs from the input.
    pub fn changed(&self) -> bool {
        self.added + self.updated > 0
    }
}

/// Merges `incoming` into a copy of `existing`.
///
/// References are applied first (insert unknown keys, replace changed ones),
/// then wiki citations are added unless an equivalent entry already exists.
pub fn merge(
    existing: &Bibliography,
    incoming: &RecordSet,
    options: &MergeOptions,
) -> MergeOutcome {
    let mut bibliography = existing.clone();
    let mut added = 0;
    let mut updated = 0;

    for reference in &incoming.references {
        match bibliography.find(reference.key()) {
            None => {
                bibliography.push(reference.clone());
                added += 1;
            }
            Some(current) if !current.same_content(reference) => {
                bibliography.replace(reference.clone());
                updated += 1;
            }
            Some(_) => {}
        }
    }

    for citation in &incoming.citations {
        let Some(entry) = entry_from_citation(citation, options) else {
            continue;
        };
        if bibliography.find(entry.key()).is_some() || citation_exists(citation, &bibliography) {
            debug!(content = %preview(&citation.content), "Citation already present");
            continue;
        }
        debug!(key = %entry.key(), content = %preview(&citation.content), "Adding citation");
        bibliography.push(entry);
        added += 1;
    }

    MergeOutcome { bibliography, added, updated }
}

/// Returns `true` if any entry's title, author, journal, booktitle, or note
/// contains the citation text, or is contained in it (case-insensitive).
/// Empty fields never match.
pub fn citation_exists(citation: &WikiCitation, bibliography: &Bibliography) -> bool {
    let text = citation.content.to_lowercase();
    bibliography.entries().any(|entry| {
        MATCH_FIELDS.iter().any(|name| {
            entry.get(name).is_some_and(|value| {
                let field = value.as_str().trim().to_lowercase();
                !field.is_empty() && (field.contains(&text) || text.contains(&field))
            })
        })
    })
}

/// Derives the stable citation key for a piece of citation text:
/// `wiki_` followed by the first 8 hex digits of its SHA-256.
pub fn citation_key(content: &str) -> Option<CitationKey> {
    let digest = Sha256::digest(content.as_bytes());
    CitationKey::new(format!("wiki_{}", &hex::encode(digest)[..8]))
}

/// Builds the bibliography entry for a wiki citation.
pub fn entry_from_citation(citation: &WikiCitation, options: &MergeOptions) -> Option<Entry> {
    let key = citation_key(&citation.content)?;
    let url = citation.source_url.as_str();

    let mut entry = Entry::new("misc", key)
        .with_field("title", FieldValue::from_text(truncate_title(&citation.content)))
        .with_field(
            "note",
            FieldValue::from_text(format!(
                "Extracted from wiki citation: {}",
                citation.kind.as_str()
            )),
        )
        .with_field("url", FieldValue::from_text(url))
        .with_field("tags", FieldValue::from_text(options.source_tag.as_str()))
        .with_field("extra", FieldValue::from_text(format!("Cited on: {url}")));

    if citation.kind == CitationKind::CiteTemplate {
        for name in ["title", "author", "year", "journal"] {
            if let Some(value) = template_param(&citation.content, name) {
                entry.set(name, FieldValue::from_text(value));
            }
        }
        if entry.get("journal").is_some() {
            entry.set_entry_type("article");
        }
    }

    Some(entry)
}

fn truncate_title(content: &str) -> String {
    match content.char_indices().nth(MAX_TITLE_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

fn preview(content: &str) -> &str {
    let end = content.char_indices().nth(50).map_or(content.len(), |(i, _)| i);
    &content[..end]
}
