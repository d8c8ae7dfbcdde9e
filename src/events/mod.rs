use serde::{Deserialize, Serialize};

use crate::batch::BatchSummary;

/// Severity attached to status changes, mapped to colors by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Working,
    Success,
    Error,
}

/// Events emitted by the orchestrator's background task.
///
/// The channel is the only contract between the batch execution context and
/// whatever front end observes it; events appear in emission order and
/// `Summary` is always the last event of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// One line of log output, either orchestrator commentary or a line
    /// streamed from an external process
    LogLine { text: String },

    /// Current orchestrator status, suitable for a status bar
    StatusChanged { text: String, severity: Severity },

    /// The batch started doing work; front ends show an activity indicator
    ProgressStarted,

    /// The batch finished or was stopped; hide the activity indicator
    ProgressStopped,

    /// End-of-run notification (the original tool's completion dialog)
    Notice { title: String, message: String },

    /// Final accounting; immutable once emitted
    Summary(BatchSummary),
}

impl Event {
    pub fn log(text: impl Into<String>) -> Self {
        Event::LogLine { text: text.into() }
    }

    pub fn status(text: impl Into<String>, severity: Severity) -> Self {
        Event::StatusChanged {
            text: text.into(),
            severity,
        }
    }
}
