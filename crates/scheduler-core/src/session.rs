use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::condition::Parameters;
use crate::config::SchedulerSettings;
use crate::error::ConfigError;
use crate::log::{LogFilter, LogRecordView, LogStore};
use crate::task::{ParamValue, ProcessTaskRegistry, Task, TaskStatus};
use crate::time::Clock;

/// Process-wide registry binding tasks, parameters, the log store, and the
/// clock. An explicit `Arc<Session>` is threaded through every constructor
/// that needs it (§9 "Global session state") — there is no implicit
/// thread-local default.
pub struct Session {
    tasks: Vec<Arc<Task>>,
    index_by_name: HashMap<String, usize>,
    parameters: RwLock<Parameters>,
    pub log: Arc<LogStore>,
    pub clock: Arc<dyn Clock>,
    pub settings: SchedulerSettings,
    pub process_registry: Arc<ProcessTaskRegistry>,
}

/// Read-API-facing view of a task, privates masked (§4.6, §6).
#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub name: String,
    pub func: String,
    pub execution: crate::task::Execution,
    pub parameters: HashMap<String, serde_json::Value>,
    pub priority: i32,
    pub status: TaskStatus,
}

impl Session {
    pub fn new(clock: Arc<dyn Clock>, settings: SchedulerSettings) -> Self {
        Self {
            tasks: Vec::new(),
            index_by_name: HashMap::new(),
            parameters: RwLock::new(HashMap::new()),
            log: Arc::new(LogStore::new(settings.log_cap_per_task)),
            clock,
            settings,
            process_registry: Arc::new(ProcessTaskRegistry::new()),
        }
    }

    pub fn with_process_registry(mut self, registry: ProcessTaskRegistry) -> Self {
        self.process_registry = Arc::new(registry);
        self
    }

    /// Registers a task. Names must be unique — a duplicate is a
    /// `ConfigError` raised at construction time; names are never renamed
    /// implicitly (see DESIGN.md).
    pub fn register_task(&mut self, task: Task) -> Result<(), ConfigError> {
        if self.index_by_name.contains_key(&task.name) {
            return Err(ConfigError::DuplicateTask(task.name));
        }
        self.index_by_name.insert(task.name.clone(), self.tasks.len());
        self.tasks.push(Arc::new(task));
        Ok(())
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn task_by_name(&self, name: &str) -> Option<&Arc<Task>> {
        self.index_by_name.get(name).map(|&i| &self.tasks[i])
    }

    pub fn known_task_names(&self) -> HashSet<String> {
        self.tasks.iter().map(|t| t.name.clone()).collect()
    }

    pub fn set_parameter(&self, name: impl Into<String>, value: ParamValue) {
        self.parameters
            .write()
            .expect("parameters lock poisoned")
            .insert(name.into(), value);
    }

    pub fn parameters_snapshot(&self) -> Parameters {
        self.parameters.read().expect("parameters lock poisoned").clone()
    }

    /// Sets `force_termination` on the named task. Returns `false` if the
    /// name is not registered (a no-op, not an error).
    pub fn request_termination(&self, task_name: &str) -> bool {
        match self.task_by_name(task_name) {
            Some(task) => {
                task.request_force_termination();
                true
            }
            None => false,
        }
    }

    /// `list_tasks()` (§4.6): non-private attributes only.
    pub fn list_tasks(&self) -> HashMap<String, TaskSummary> {
        self.tasks
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    TaskSummary {
                        name: t.name.clone(),
                        func: t.func_description(),
                        execution: t.execution(),
                        parameters: t
                            .parameters
                            .iter()
                            .map(|(k, v)| (k.clone(), v.masked()))
                            .collect(),
                        priority: t.priority,
                        status: self.task_status(&t.name),
                    },
                )
            })
            .collect()
    }

    /// Derives a task's current status (§4.4, §4.6). When
    /// `force_status_from_logs` is set, always scans the live, authoritative
    /// log; otherwise uses the cheap FIFO-capped per-task tail, which is
    /// sufficient because status only ever depends on the most recent
    /// records and the cap is never smaller than one.
    pub fn task_status(&self, task_name: &str) -> TaskStatus {
        if self.settings.force_status_from_logs {
            let records = self.log.read(&LogFilter {
                task_name: Some(task_name.to_string()),
                ..Default::default()
            });
            TaskStatus::from_records(records.iter())
        } else {
            let tail = self.log.per_task_tail(task_name);
            TaskStatus::from_records(tail.iter())
        }
    }

    /// `list_parameters()` (§4.6, §6): privates rendered as `"*****"`.
    pub fn list_parameters(&self) -> HashMap<String, serde_json::Value> {
        self.parameters
            .read()
            .expect("parameters lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.masked()))
            .collect()
    }

    /// `read_task_logs(filters)` (§4.6, §6). Always reads the live log, not
    /// the scheduler's internal snapshot.
    pub fn read_task_logs(&self, filter: &LogFilter) -> Vec<LogRecordView> {
        self.log
            .read(filter)
            .iter()
            .map(LogRecordView::from)
            .collect()
    }

    pub fn reset(&mut self) {
        self.tasks.clear();
        self.index_by_name.clear();
        *self.parameters.write().expect("parameters lock poisoned") = HashMap::new();
    }
}

/// Convenience used by tests and the read API: count terminal actions for a
/// task straight off the live log, bypassing the scheduler's cycle-scoped
/// snapshot.
pub fn terminal_count(session: &Session, task_name: &str) -> usize {
    session
        .log
        .read(&LogFilter {
            task_name: Some(task_name.to_string()),
            ..Default::default()
        })
        .iter()
        .filter(|r| r.action.is_terminal())
        .count()
}
