//! Event logging subsystem for rlink.
//!
//! Evaluations append audit events in NDJSON format (one JSON object per
//! line): submissions, completions, script errors, and the anomalies that
//! teardown tolerates (tailer timeouts, missing output files, cleanup
//! failures). The log is optional; when no path is configured, appends are
//! no-ops.
//!
//! Appends are best-effort by design: teardown must never fail because
//! logging did, so write failures degrade to a stderr warning.
//!
//! # Event Format
//!
//! Each event is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: The action performed (submit, complete, script_error, ...)
//! - `actor`: The owner string (e.g., `user@HOST`)
//! - `task`: Optional task ID for task-specific events
//! - `details`: Freeform object with action-specific details

use crate::error::{Result, RlinkError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Script submitted for evaluation
    Submit,
    /// Evaluation completed
    Complete,
    /// Script signaled an error through the tag protocol
    ScriptError,
    /// The remote evaluation call raised
    EvalError,
    /// Tailer thread did not terminate within the join timeout
    TailerTimeout,
    /// Tailer stopped on a read or parse failure
    TailerFailure,
    /// Output file was already gone at cleanup
    MissingOutputFile,
    /// A teardown step failed
    CleanupFailure,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Submit => write!(f, "submit"),
            EventAction::Complete => write!(f, "complete"),
            EventAction::ScriptError => write!(f, "script_error"),
            EventAction::EvalError => write!(f, "eval_error"),
            EventAction::TailerTimeout => write!(f, "tailer_timeout"),
            EventAction::TailerFailure => write!(f, "tailer_failure"),
            EventAction::MissingOutputFile => write!(f, "missing_output_file"),
            EventAction::CleanupFailure => write!(f, "cleanup_failure"),
        }
    }
}

/// An event record for the audit log.
///
/// Events are serialized as single-line JSON objects and appended to
/// the configured events file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// The actor who performed the action (e.g., `user@HOST`).
    pub actor: String,

    /// Optional task ID for task-specific events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event with the given action.
    ///
    /// The timestamp is set to the current time, and the actor is
    /// determined from the environment (USER@HOSTNAME).
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: get_actor_string(),
            task: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the task ID for this event.
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task = Some(task_id.into());
        self
    }

    /// Set the task ID for this event, if one is known.
    pub fn with_task_opt(mut self, task_id: Option<String>) -> Self {
        self.task = task_id;
        self
    }

    /// Set the details object for this event.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RlinkError::Resource(format!("failed to serialize event to JSON: {}", e)))
    }
}

/// Get the actor string for event metadata.
fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append-only event log bound to an optional file path.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    /// Create a log writing to the given file, or a disabled log for `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// A log that drops every event.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Append an event, best-effort.
    ///
    /// Failures are reported once on stderr and otherwise swallowed.
    pub fn append(&self, event: &Event) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = self.try_append(path, event) {
            eprintln!("Warning: failed to log {} event: {}", event.action, e);
        }
    }

    fn try_append(&self, path: &PathBuf, event: &Event) -> Result<()> {
        let json_line = event.to_ndjson_line()?;

        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                RlinkError::Resource(format!(
                    "failed to create events directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                RlinkError::Resource(format!(
                    "failed to open events file '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            RlinkError::Resource(format!(
                "failed to write event to '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(())
    }
}
