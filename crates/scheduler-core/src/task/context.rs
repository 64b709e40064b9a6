use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::session::Session;

use super::model::Parameters;

/// Cooperative cancellation signal for threaded tasks. The task body polls
/// [`CancellationToken::is_set`] at safe points and returns
/// [`crate::error::TaskFailure::Terminated`] when set. Reimplements the
/// source's shared-flag-plus-sentinel-exception pattern as an explicit typed
/// field (§9).
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Handle for introspection/mutation passed into running task bodies (§6).
/// Lets a task set another task's `force_termination` flag.
#[derive(Clone)]
pub struct SchedulerHandle {
    session: Arc<Session>,
}

impl SchedulerHandle {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Requests termination of the named task. No-op (returns `false`) if
    /// the name is not registered.
    pub fn request_termination(&self, task_name: &str) -> bool {
        self.session.request_termination(task_name)
    }
}

/// What a task callable receives. Carries the cancellation signal (for
/// cooperative termination) and a scheduler handle (for cross-task
/// coordination), plus the task's own resolved parameters.
pub struct TaskContext {
    pub cancellation: CancellationToken,
    pub scheduler: SchedulerHandle,
    pub parameters: Parameters,
}
