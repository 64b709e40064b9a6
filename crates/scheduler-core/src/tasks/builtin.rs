use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::error::TaskFailure;
use crate::task::{InlineFn, ProcessTaskRegistry, TaskContext};

/// A threaded/inline task body that sleeps for `total` in small slices,
/// checking [`crate::task::CancellationToken::is_set`] between slices, then
/// writes an empty file at `path` if it ran to completion uninterrupted.
/// Grounds §8 scenarios 1 and 2 (the slow task).
pub fn sleep_and_write_file(total: Duration, path: PathBuf) -> InlineFn {
    std::sync::Arc::new(move |ctx: &TaskContext| -> Result<(), TaskFailure> {
        const SLICE: Duration = Duration::from_millis(5);
        let mut remaining = total;
        while remaining > Duration::ZERO {
            if ctx.cancellation.is_set() {
                return Err(TaskFailure::Terminated);
            }
            let step = remaining.min(SLICE);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        std::fs::write(&path, b"").map_err(|e| TaskFailure::Failed(e.to_string()))?;
        Ok(())
    })
}

/// An inline/threaded task body that succeeds immediately without doing any
/// work. Used where a test or demo needs a minimal, instantly-terminal task.
pub fn noop_inline() -> InlineFn {
    std::sync::Arc::new(|_ctx: &TaskContext| -> Result<(), TaskFailure> { Ok(()) })
}

/// An inline task whose sole purpose is to request termination of another
/// task as soon as it has started. Grounds §8 scenario 3 (external
/// termination).
pub fn terminator_for(target_task: impl Into<String>) -> InlineFn {
    let target_task = target_task.into();
    std::sync::Arc::new(move |ctx: &TaskContext| -> Result<(), TaskFailure> {
        ctx.scheduler.request_termination(&target_task);
        Ok(())
    })
}

/// Registered process-task body: always succeeds with a null payload.
pub fn noop_success(_params: Value) -> Result<Value, TaskFailure> {
    Ok(Value::Null)
}

/// Registered process-task body: always fails. Grounds §8 scenario 4.
pub fn always_fail(_params: Value) -> Result<Value, TaskFailure> {
    Err(TaskFailure::Failed("registered process task failed by design".to_string()))
}

/// The registry shared by `scheduler-cli` (which constructs process tasks
/// referencing these names) and `scheduler-worker` (which resolves them by
/// name in the child process, since a child cannot inherit a closure — see
/// DESIGN.md).
pub fn demo_registry() -> ProcessTaskRegistry {
    let mut registry = ProcessTaskRegistry::new();
    registry.register("noop_success", noop_success);
    registry.register("always_fail", always_fail);
    registry
}
