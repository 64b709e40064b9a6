use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lifecycle event appended to the log. The regular language
/// `(run (success|fail|terminate|crash))*` governs the sequence of actions
/// for any single task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Run,
    Success,
    Fail,
    Terminate,
    Inaction,
    Crash,
}

impl Action {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Action::Success | Action::Fail | Action::Terminate | Action::Crash
        )
    }
}

/// One immutable event in the append-only history. `created` is the instant
/// the scheduler's injected [`crate::time::Clock`] reported when the record
/// was appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub created: DateTime<Utc>,
    pub task_name: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exc_text: Option<String>,
}

impl LogRecord {
    pub fn new(created: DateTime<Utc>, task_name: impl Into<String>, action: Action) -> Self {
        Self {
            created,
            task_name: task_name.into(),
            action,
            exc_text: None,
        }
    }

    pub fn with_exc_text(mut self, exc_text: impl Into<String>) -> Self {
        self.exc_text = Some(exc_text.into());
        self
    }
}

/// Serializable, read-API-facing view of a [`LogRecord`] with the timestamp
/// rendered to second precision, per the `asctime` contract (§6).
#[derive(Debug, Clone, Serialize)]
pub struct LogRecordView {
    pub asctime: String,
    pub action: Action,
    pub task_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exc_text: Option<String>,
}

impl From<&LogRecord> for LogRecordView {
    fn from(record: &LogRecord) -> Self {
        Self {
            asctime: record.created.format("%Y-%m-%dT%H:%M:%S").to_string(),
            action: record.action,
            task_name: record.task_name.clone(),
            exc_text: record.exc_text.clone(),
        }
    }
}
