use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::condition::Condition;
use crate::error::TaskFailure;
use crate::time::Timeout;

use super::context::TaskContext;

/// A parameter value, optionally wrapped as "private" so it never appears
/// unmasked on any read-API response (§9).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Plain(Value),
    Private(Value),
}

impl ParamValue {
    pub fn raw(&self) -> &Value {
        match self {
            ParamValue::Plain(v) | ParamValue::Private(v) => v,
        }
    }

    /// Projection used on every read path: private values render as the
    /// literal mask string, never the underlying value.
    pub fn masked(&self) -> Value {
        match self {
            ParamValue::Plain(v) => v.clone(),
            ParamValue::Private(_) => Value::String("*****".to_string()),
        }
    }
}

pub type Parameters = HashMap<String, ParamValue>;

/// The three execution backends a task can run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    Inline,
    Threaded,
    Process,
}

/// A task's point-in-time lifecycle state, reconstructed from its most
/// recent non-`inaction` log record (§4.3, §4.4). `Idle` covers both "never
/// run" and "ran and is between cycles with no pending log record" — the two
/// are indistinguishable from the log alone, which is why `Idle` has no
/// further detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
    Terminated,
    Crashed,
}

impl TaskStatus {
    /// Derives a status from a task's log records in chronological order,
    /// skipping `inaction` entries — they record a cycle where the task was
    /// considered but not started, and take no part in the
    /// `(run (success|fail|terminate|crash))*` lifecycle sequence.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a crate::log::LogRecord>) -> Self {
        use crate::log::Action;

        let last = records
            .into_iter()
            .filter(|r| r.action != Action::Inaction)
            .last();
        match last.map(|r| r.action) {
            None => TaskStatus::Idle,
            Some(Action::Run) => TaskStatus::Running,
            Some(Action::Success) => TaskStatus::Succeeded,
            Some(Action::Fail) => TaskStatus::Failed,
            Some(Action::Terminate) => TaskStatus::Terminated,
            Some(Action::Crash) => TaskStatus::Crashed,
            Some(Action::Inaction) => unreachable!("filtered out above"),
        }
    }
}

pub type InlineFn = Arc<dyn Fn(&TaskContext) -> Result<(), TaskFailure> + Send + Sync>;

/// What a task actually runs. `process` tasks cannot carry an arbitrary
/// closure — a child process cannot inherit one — so they instead carry a
/// name resolved through the [`super::registry::ProcessTaskRegistry`] (§3.2,
/// §9 "Pickled process tasks").
#[derive(Clone)]
pub enum TaskBody {
    Inline(InlineFn),
    Threaded(InlineFn),
    Process { registered_name: String },
}

impl TaskBody {
    pub fn execution(&self) -> Execution {
        match self {
            TaskBody::Inline(_) => Execution::Inline,
            TaskBody::Threaded(_) => Execution::Threaded,
            TaskBody::Process { .. } => Execution::Process,
        }
    }
}

/// A unit of schedulable work. Identity is `name`; lifecycle status is
/// never stored here — it is always reconstructed from the log (§4.4).
pub struct Task {
    pub name: String,
    pub body: TaskBody,
    pub start_cond: Condition,
    pub end_cond: Option<Condition>,
    /// `None` means "use the scheduler's `default_timeout` setting"; see
    /// [`Task::effective_timeout`] and §3.6/§3.7.
    pub timeout: Option<Timeout>,
    pub priority: i32,
    pub parameters: Parameters,
    force_termination: AtomicBool,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        body: TaskBody,
        start_cond: Condition,
        timeout: Option<Timeout>,
        priority: i32,
        parameters: Parameters,
    ) -> Self {
        Self {
            name: name.into(),
            body,
            start_cond,
            end_cond: None,
            timeout,
            priority,
            parameters,
            force_termination: AtomicBool::new(false),
        }
    }

    pub fn with_end_cond(mut self, cond: Condition) -> Self {
        self.end_cond = Some(cond);
        self
    }

    /// Resolves this task's timeout against the scheduler's `default_timeout`
    /// setting when the task did not set its own (§3.6: "a scheduler-level
    /// `timeout` may also be specified; interpretation: default per-task
    /// timeout if a task does not set its own").
    pub fn effective_timeout(&self, scheduler_default: Timeout) -> Timeout {
        self.timeout.unwrap_or(scheduler_default)
    }

    pub fn execution(&self) -> Execution {
        self.body.execution()
    }

    pub fn force_termination_requested(&self) -> bool {
        self.force_termination.load(Ordering::SeqCst)
    }

    pub fn request_force_termination(&self) {
        self.force_termination.store(true, Ordering::SeqCst);
    }

    /// Cleared by the scheduler once it has acted on a pending request.
    pub fn clear_force_termination(&self) {
        self.force_termination.store(false, Ordering::SeqCst);
    }

    /// Stringified, read-API-facing rendering of the task's work (§6).
    pub fn func_description(&self) -> String {
        match &self.body {
            TaskBody::Inline(_) => format!("{}::inline", self.name),
            TaskBody::Threaded(_) => format!("{}::threaded", self.name),
            TaskBody::Process { registered_name } => registered_name.clone(),
        }
    }
}
