//! Trigger policy: which events start a run.
//!
//! Three event classes can start a run: the daily schedule, a manual request,
//! and a push that touches a watched path. Everything else is ignored.

use chrono::{Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifiers::RunId;
use crate::types::Timestamp;

/// Errors raised while building a [`TriggerPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    /// The schedule is not of the form `M H * * *`.
    #[error("unsupported schedule '{expression}': {reason}")]
    InvalidSchedule {
        /// Expression as configured.
        expression: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A watch-list entry is not a valid glob.
    #[error("invalid watch path '{pattern}': {reason}")]
    InvalidWatchPath {
        /// Pattern as configured.
        pattern: String,
        /// Parser message.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A once-a-day UTC schedule, written as the cron expression `M H * * *`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySchedule {
    expression: String,
    time: NaiveTime,
}

impl DailySchedule {
    /// Parses a five-field cron expression whose day, month, and weekday
    /// fields are all `*`.
    pub fn parse(expression: &str) -> Result<Self, TriggerError> {
        let invalid = |reason: &str| TriggerError::InvalidSchedule {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(invalid("expected five fields"));
        };
        if [day, month, weekday].iter().any(|f| **f != "*") {
            return Err(invalid("only daily schedules are supported"));
        }
        let minute: u32 = minute.parse().map_err(|_| invalid("minute is not a number"))?;
        let hour: u32 = hour.parse().map_err(|_| invalid("hour is not a number"))?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| invalid("hour or minute out of range"))?;

        Ok(Self { expression: fields.join(" "), time })
    }

    /// The normalised cron expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`.
    pub fn next_after(&self, after: Timestamp) -> Timestamp {
        let now = after.as_datetime();
        let today = Utc.from_utc_datetime(&now.date_naive().and_time(self.time));
        let next = if today > now { today } else { today + ChronoDuration::days(1) };
        Timestamp::from_utc(next)
    }

    /// Returns `true` if `expression` denotes this schedule (whitespace-insensitive).
    pub fn matches_expression(&self, expression: &str) -> bool {
        expression.split_whitespace().collect::<Vec<_>>().join(" ") == self.expression
    }
}

impl std::fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (daily at {} UTC)", self.expression, self.time.format("%H:%M"))
    }
}

// ---------------------------------------------------------------------------
// Events and intents
// ---------------------------------------------------------------------------

/// An event observed by an event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// A schedule fired. `cron` is the expression that fired, when known.
    Schedule {
        /// Cron expression reported by the platform.
        cron: Option<String>,
    },
    /// Someone asked for a run.
    Manual,
    /// Commits were pushed.
    Push {
        /// Repository-relative paths touched by the pushed commits.
        changed_paths: Vec<String>,
    },
    /// Any other platform event.
    Other {
        /// Platform event name.
        name: String,
    },
}

/// Why a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Daily schedule.
    Schedule,
    /// Manual request.
    Manual,
    /// Push touching a watched path.
    Push,
}

impl TriggerKind {
    /// Returns the trigger name as used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Schedule => "schedule",
            TriggerKind::Manual => "manual",
            TriggerKind::Push => "push",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision to start one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIntent {
    /// Fresh identifier for the run.
    pub run_id: RunId,
    /// What started it.
    pub trigger: TriggerKind,
}

impl RunIntent {
    /// Creates an intent with a fresh run id.
    pub fn new(trigger: TriggerKind) -> Self {
        Self { run_id: RunId::new_random(), trigger }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Decides which events start a run.
#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    schedule: DailySchedule,
    watch_patterns: Vec<String>,
    watch: GlobSet,
    manual: bool,
}

impl TriggerPolicy {
    /// Builds a policy. Each watch-list entry is an exact repository-relative
    /// path or a glob (`**` crosses directories).
    pub fn new(
        schedule: DailySchedule,
        watch_paths: &[String],
        manual: bool,
    ) -> Result<Self, TriggerError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in watch_paths {
            let glob = Glob::new(pattern.trim_start_matches("./")).map_err(|e| {
                TriggerError::InvalidWatchPath { pattern: pattern.clone(), reason: e.to_string() }
            })?;
            builder.add(glob);
        }
        let watch = builder.build().map_err(|e| TriggerError::InvalidWatchPath {
            pattern: watch_paths.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self { schedule, watch_patterns: watch_paths.to_vec(), watch, manual })
    }

    /// The configured schedule.
    pub fn schedule(&self) -> &DailySchedule {
        &self.schedule
    }

    /// Watch-list entries as configured.
    pub fn watch_paths(&self) -> &[String] {
        &self.watch_patterns
    }

    /// Returns `true` if `path` is on the watch list.
    pub fn watches(&self, path: &str) -> bool {
        self.watch.is_match(path.trim_start_matches("./"))
    }

    /// Evaluates an event, producing a run intent when it should start a run.
    pub fn evaluate(&self, event: &TriggerEvent) -> Option<RunIntent> {
        let trigger = match event {
            TriggerEvent::Schedule { cron } => {
                let on_schedule = cron
                    .as_deref()
                    .map_or(true, |c| self.schedule.matches_expression(c));
                on_schedule.then_some(TriggerKind::Schedule)?
            }
            TriggerEvent::Manual => self.manual.then_some(TriggerKind::Manual)?,
            TriggerEvent::Push { changed_paths } => changed_paths
                .iter()
                .any(|p| self.watches(p))
                .then_some(TriggerKind::Push)?,
            TriggerEvent::Other { .. } => return None,
        };
        Some(RunIntent::new(trigger))
    }
}
