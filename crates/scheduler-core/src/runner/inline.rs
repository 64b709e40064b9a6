use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crate::error::TaskFailure;
use crate::task::{CancellationToken, SchedulerHandle, Task, TaskBody, TaskContext};

use super::{Outcome, PollOutcome, RunHandle, Runner};

/// Runs the task body synchronously on the scheduler's control thread.
/// Blocks the cycle; timeout and forced termination cannot interrupt an
/// in-flight call (§4.3). A panic is caught and rendered the same as a
/// returned `Err` — both become a `fail` record with captured text.
pub struct InlineRunner;

impl Runner for InlineRunner {
    fn launch(&self, task: &Task, scheduler: SchedulerHandle) -> RunHandle {
        let f = match &task.body {
            TaskBody::Inline(f) => f.clone(),
            _ => panic!("InlineRunner invoked on a non-inline task"),
        };
        let ctx = TaskContext {
            cancellation: CancellationToken::new(),
            scheduler,
            parameters: task.parameters.clone(),
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| f(&ctx)));
        let outcome = match result {
            Ok(Ok(())) => Outcome::Success,
            Ok(Err(TaskFailure::Failed(msg))) => Outcome::Failed(msg),
            Ok(Err(TaskFailure::Terminated)) => Outcome::Terminated,
            Err(panic_payload) => Outcome::Failed(describe_panic(panic_payload)),
        };
        RunHandle::Inline(outcome)
    }

    fn poll(&self, handle: &RunHandle) -> PollOutcome {
        match handle {
            RunHandle::Inline(outcome) => PollOutcome::Done(outcome.clone()),
            _ => panic!("InlineRunner polled a non-inline handle"),
        }
    }

    fn signal_terminate(&self, _handle: &RunHandle) {
        // Inline tasks are not cancellable mid-execution (§4.3, §5).
    }

    fn join(&self, handle: RunHandle, _grace: Duration) -> Outcome {
        match handle {
            RunHandle::Inline(outcome) => outcome,
            _ => panic!("InlineRunner joined a non-inline handle"),
        }
    }
}

fn describe_panic(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}
