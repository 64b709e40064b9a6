mod inline;
mod process;
pub mod protocol;
mod threaded;

use std::time::Duration;

pub use inline::InlineRunner;
pub use process::ProcessRunner;
pub use threaded::ThreadedRunner;

use crate::task::{SchedulerHandle, Task};

/// Terminal result of a task run, independent of which backend produced it.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success,
    Failed(String),
    Terminated,
    Crashed(String),
}

#[derive(Debug)]
pub enum PollOutcome {
    Running,
    Done(Outcome),
}

/// Uniform handle over the three backend-specific in-flight representations
/// (§4.3). Inline work is represented already-finished since it runs to
/// completion inside `launch`.
pub enum RunHandle {
    Inline(Outcome),
    Threaded(threaded::ThreadedHandle),
    Process(process::ProcessHandle),
}

/// Shared contract for the three execution backends: launch, poll for
/// completion, request cooperative/forceful termination, and join with a
/// bounded grace period.
pub trait Runner: Send + Sync {
    fn launch(&self, task: &Task, scheduler: SchedulerHandle) -> RunHandle;
    fn poll(&self, handle: &RunHandle) -> PollOutcome;
    fn signal_terminate(&self, handle: &RunHandle);
    fn join(&self, handle: RunHandle, grace: Duration) -> Outcome;
}
