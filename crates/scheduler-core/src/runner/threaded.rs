use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::TaskFailure;
use crate::task::{CancellationToken, SchedulerHandle, Task, TaskBody, TaskContext};

use super::{Outcome, PollOutcome, RunHandle, Runner};

pub struct ThreadedHandle {
    receiver: Receiver<Outcome>,
    cancellation: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

/// Runs the task body on a dedicated joinable worker thread (grounded in the
/// teacher's rayon-pool dispatch, but one thread per run so termination and
/// join semantics stay precise per task, §4.3).
pub struct ThreadedRunner;

impl Runner for ThreadedRunner {
    fn launch(&self, task: &Task, scheduler: SchedulerHandle) -> RunHandle {
        let f = match &task.body {
            TaskBody::Threaded(f) => f.clone(),
            _ => panic!("ThreadedRunner invoked on a non-threaded task"),
        };
        let cancellation = CancellationToken::new();
        let ctx = TaskContext {
            cancellation: cancellation.clone(),
            scheduler,
            parameters: task.parameters.clone(),
        };
        let (tx, rx) = mpsc::channel();

        let join_handle = std::thread::Builder::new()
            .name(format!("task-{}", task.name))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| f(&ctx)));
                let outcome = match result {
                    Ok(Ok(())) => Outcome::Success,
                    Ok(Err(TaskFailure::Failed(msg))) => Outcome::Failed(msg),
                    Ok(Err(TaskFailure::Terminated)) => Outcome::Terminated,
                    Err(panic_payload) => Outcome::Failed(super_describe_panic(panic_payload)),
                };
                let _ = tx.send(outcome);
            })
            .expect("failed to spawn worker thread");

        RunHandle::Threaded(ThreadedHandle {
            receiver: rx,
            cancellation,
            join_handle: Some(join_handle),
        })
    }

    fn poll(&self, handle: &RunHandle) -> PollOutcome {
        let RunHandle::Threaded(h) = handle else {
            panic!("ThreadedRunner polled a non-threaded handle");
        };
        match h.receiver.try_recv() {
            Ok(outcome) => PollOutcome::Done(outcome),
            Err(mpsc::TryRecvError::Empty) => PollOutcome::Running,
            Err(mpsc::TryRecvError::Disconnected) => {
                PollOutcome::Done(Outcome::Failed("worker thread dropped without a result".into()))
            }
        }
    }

    fn signal_terminate(&self, handle: &RunHandle) {
        let RunHandle::Threaded(h) = handle else {
            panic!("ThreadedRunner signalled a non-threaded handle");
        };
        h.cancellation.set();
    }

    fn join(&self, handle: RunHandle, grace: Duration) -> Outcome {
        let RunHandle::Threaded(mut h) = handle else {
            panic!("ThreadedRunner joined a non-threaded handle");
        };
        match h.receiver.recv_timeout(grace) {
            Ok(outcome) => {
                if let Some(jh) = h.join_handle.take() {
                    let _ = jh.join();
                }
                outcome
            }
            Err(_) => {
                // Worker did not cooperate within the grace period. Recorded
                // as terminated regardless; the handle is dropped and the
                // thread is left to exit on its own (documented limitation,
                // §4.3 — threaded tasks must cooperate).
                Outcome::Terminated
            }
        }
    }
}

fn super_describe_panic(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}
