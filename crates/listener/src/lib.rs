//! bibsync trigger event sources.
//!
//! Implements the [`pipeline::EventSource`] trait with two backends:
//!
//! - [`ActionsEventSource`] — reads the event that started the current GitHub
//!   Actions job from `GITHUB_EVENT_NAME` and the JSON payload at
//!   `GITHUB_EVENT_PATH`. Yields exactly one event.
//!
//! - [`ScheduleEventSource`] — sleeps until the next fire time of a
//!   [`pipeline::DailySchedule`] and yields a schedule event, forever. Used by
//!   `bibsync schedule` outside of CI.
//!
//! ## Deployment Scenarios
//!
//! | Scenario | EventSource | Notes |
//! |----------|-------------|-------|
//! | GitHub Actions workflow | `ActionsEventSource` | `bibsync run` |
//! | Local one-off | Single-shot (synthesised in `cli`) | `bibsync run --trigger manual` |
//! | Long-lived host | `ScheduleEventSource` | `bibsync schedule` |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Environment lookup and payload deserialization live
//! here. The [`pipeline`] crate sees only [`pipeline::EventSource`] and
//! [`pipeline::TriggerEvent`]; whether an event starts a run is decided by
//! [`pipeline::TriggerPolicy`].

mod actions;
mod schedule;

use thiserror::Error;

pub use actions::{event_from_payload, ActionsEventSource, EVENT_NAME_ENV, EVENT_PATH_ENV};
pub use schedule::ScheduleEventSource;

/// Failures building an event source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    /// A required environment variable is unset or empty.
    #[error("environment variable {name} is not set; is this running inside GitHub Actions?")]
    MissingEnv {
        /// Variable name.
        name: &'static str,
    },

    /// The event payload file could not be read.
    #[error("cannot read event payload {path}: {message}")]
    Io {
        /// Payload path.
        path: String,
        /// OS error text.
        message: String,
    },

    /// The event payload is not valid JSON.
    #[error("invalid event payload {path}: {message}")]
    Payload {
        /// Payload path.
        path: String,
        /// Parser message.
        message: String,
    },
}
