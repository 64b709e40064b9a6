use std::collections::HashMap;

use serde_json::Value;

use crate::error::TaskFailure;

pub type ProcessTaskFn = fn(Value) -> Result<Value, TaskFailure>;

/// Registry of process-executable task bodies, addressed by name. A child
/// process cannot inherit an arbitrary Rust closure, so `process` tasks are
/// instead registered callables resolved by name in both the parent (for
/// validation at construction time) and the `scheduler-worker` child binary
/// (§3.2, §9 "Pickled process tasks").
#[derive(Clone, Default)]
pub struct ProcessTaskRegistry {
    entries: HashMap<String, ProcessTaskFn>,
}

impl ProcessTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: ProcessTaskFn) {
        self.entries.insert(name.into(), f);
    }

    pub fn get(&self, name: &str) -> Option<ProcessTaskFn> {
        self.entries.get(name).copied()
    }

    /// Invokes a registered task body by name. The `UnknownProcessTask`
    /// error produced when `name` was never registered is surfaced as an
    /// ordinary [`TaskFailure`] because this runs inside the child process,
    /// where it is indistinguishable from any other task failure to the
    /// parent's protocol reader.
    pub fn invoke(&self, name: &str, params: Value) -> Result<Value, TaskFailure> {
        let f = self.get(name).ok_or_else(|| {
            TaskFailure::Failed(format!("unregistered process task: {name}"))
        })?;
        f(params)
    }
}
