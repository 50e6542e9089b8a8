//! The GitHub Actions event that started the current job.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use pipeline::{EventSource, TriggerEvent};
use serde::Deserialize;
use tracing::{debug, info};

use crate::ListenerError;

/// Environment variable holding the triggering event's name.
pub const EVENT_NAME_ENV: &str = "GITHUB_EVENT_NAME";
/// Environment variable holding the path of the event's JSON payload.
pub const EVENT_PATH_ENV: &str = "GITHUB_EVENT_PATH";

/// Yields the current job's event once, then reports exhaustion.
#[derive(Debug, Clone)]
pub struct ActionsEventSource {
    pending: Option<TriggerEvent>,
}

impl ActionsEventSource {
    /// Wraps an already decoded event.
    pub fn new(event: TriggerEvent) -> Self {
        Self { pending: Some(event) }
    }

    /// Reads the event from the process environment.
    pub fn from_env() -> Result<Self, ListenerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the event using `lookup` for environment variables.
    ///
    /// The payload file is optional: events that carry no interesting data
    /// (e.g. `workflow_dispatch`) decode from their name alone.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ListenerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let name = non_empty(EVENT_NAME_ENV)
            .ok_or(ListenerError::MissingEnv { name: EVENT_NAME_ENV })?;
        let payload = match non_empty(EVENT_PATH_ENV) {
            Some(path) => read_payload(Path::new(&path))?,
            None => serde_json::Value::Null,
        };

        let event = event_from_payload(name.trim(), &payload);
        info!(event_name = %name.trim(), event = ?event, "Decoded Actions event");
        Ok(Self::new(event))
    }

    /// The event that has not been handed out yet, if any.
    pub fn peek(&self) -> Option<&TriggerEvent> {
        self.pending.as_ref()
    }
}

#[async_trait]
impl EventSource for ActionsEventSource {
    async fn next_event(&mut self) -> Option<TriggerEvent> {
        self.pending.take()
    }
}

fn read_payload(path: &Path) -> Result<serde_json::Value, ListenerError> {
    let text = std::fs::read_to_string(path).map_err(|e| ListenerError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| ListenerError::Payload {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    #[serde(default)]
    commits: Vec<PushCommit>,
    #[serde(default)]
    head_commit: Option<PushCommit>,
}

#[derive(Debug, Default, Deserialize)]
struct PushCommit {
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    modified: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
}

/// Maps an Actions event name and payload to a [`TriggerEvent`].
///
/// Push events carry the union of every commit's added, modified, and
/// removed paths. Unknown events decode to [`TriggerEvent::Other`].
pub fn event_from_payload(name: &str, payload: &serde_json::Value) -> TriggerEvent {
    match name {
        "schedule" => TriggerEvent::Schedule {
            cron: payload.get("schedule").and_then(|v| v.as_str()).map(str::to_string),
        },
        "workflow_dispatch" => TriggerEvent::Manual,
        "push" => {
            let push = PushPayload::deserialize(payload).unwrap_or_default();
            let mut paths = BTreeSet::new();
            for commit in push.commits.iter().chain(push.head_commit.iter()) {
                paths.extend(commit.added.iter().cloned());
                paths.extend(commit.modified.iter().cloned());
                paths.extend(commit.removed.iter().cloned());
            }
            debug!(count = paths.len(), "Collected pushed paths");
            TriggerEvent::Push { changed_paths: paths.into_iter().collect() }
        }
        other => TriggerEvent::Other { name: other.to_string() },
    }
}
