//! Reference-manager credentials as a capability object.
//!
//! Only code that is handed a [`ZoteroCredentials`] can talk to the reference
//! manager. The value is never printed: `Debug` is redacted and there is no
//! `Display` or `Serialize`.

use secrecy::{ExposeSecret, SecretString};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "ZOTERO_API_KEY";
/// Environment variable holding the user (or group) identifier.
pub const USER_ID_ENV: &str = "ZOTERO_USER_ID";

/// API key and library owner for the Zotero Web API.
#[derive(Clone)]
pub struct ZoteroCredentials {
    api_key: SecretString,
    user_id: SecretString,
}

impl ZoteroCredentials {
    /// Creates credentials, returning `None` if either value is blank.
    pub fn new(api_key: impl Into<String>, user_id: impl Into<String>) -> Option<Self> {
        let api_key = api_key.into();
        let user_id = user_id.into();
        if api_key.trim().is_empty() || user_id.trim().is_empty() {
            return None;
        }
        Some(Self {
            api_key: SecretString::from(api_key.trim().to_string()),
            user_id: SecretString::from(user_id.trim().to_string()),
        })
    }

    /// Reads credentials through `lookup` (normally `std::env::var`).
    ///
    /// Returns `None` when either variable is missing or blank.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(lookup(API_KEY_ENV)?, lookup(USER_ID_ENV)?)
    }

    /// The API key. Callers must not log or persist it.
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// The user or group identifier. Callers must not log or persist it.
    pub fn user_id(&self) -> &str {
        self.user_id.expose_secret()
    }

    /// Environment pairs for a child process, in the variable names the
    /// external sync executor expects.
    pub fn env_pairs(&self) -> [(&'static str, &str); 2] {
        [(API_KEY_ENV, self.api_key()), (USER_ID_ENV, self.user_id())]
    }
}

impl std::fmt::Debug for ZoteroCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ZoteroCredentials([REDACTED])")
    }
}
