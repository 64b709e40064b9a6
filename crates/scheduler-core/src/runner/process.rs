use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::task::{SchedulerHandle, Task, TaskBody};

use super::protocol::{WorkerRequest, WorkerResponse};
use super::{Outcome, PollOutcome, RunHandle, Runner};

pub struct ProcessHandle {
    pid: Option<i32>,
    receiver: Receiver<Outcome>,
    reader_thread: Option<JoinHandle<()>>,
}

/// Runs the task body in a child `scheduler-worker` process (§4.3).
/// Parameters travel as a JSON request on the child's stdin; the outcome
/// comes back as a JSON response on stdout. Termination sends `SIGTERM`,
/// then `SIGKILL` after the grace period elapses.
pub struct ProcessRunner {
    worker_binary: PathBuf,
}

impl ProcessRunner {
    pub fn new(worker_binary: PathBuf) -> Self {
        Self { worker_binary }
    }
}

impl Runner for ProcessRunner {
    fn launch(&self, task: &Task, _scheduler: SchedulerHandle) -> RunHandle {
        let registered_name = match &task.body {
            TaskBody::Process { registered_name } => registered_name.clone(),
            _ => panic!("ProcessRunner invoked on a non-process task"),
        };
        let params = serde_json::to_value(
            task.parameters
                .iter()
                .map(|(k, v)| (k.clone(), v.raw().clone()))
                .collect::<std::collections::HashMap<_, _>>(),
        )
        .unwrap_or(serde_json::Value::Null);

        let spawned = Command::new(&self.worker_binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return immediate(Outcome::Crashed(format!("failed to spawn process task: {e}"))),
        };

        let pid = child.id() as i32;
        let request = WorkerRequest {
            task: registered_name,
            params,
        };

        let mut stdin = child.stdin.take().expect("piped stdin");
        let write_result = serde_json::to_vec(&request)
            .map_err(std::io::Error::other)
            .and_then(|mut bytes| {
                bytes.push(b'\n');
                stdin.write_all(&bytes)
            });
        drop(stdin);
        if let Err(e) = write_result {
            let _ = child.kill();
            return immediate(Outcome::Crashed(format!("failed to write task request: {e}")));
        }

        let (tx, rx) = mpsc::channel();
        let reader_thread = std::thread::spawn(move || {
            let stdout = child.stdout.take();
            let outcome = match stdout {
                Some(out) => read_response(out, &mut child),
                None => Outcome::Crashed("child process had no stdout".to_string()),
            };
            let _ = child.wait();
            let _ = tx.send(outcome);
        });

        RunHandle::Process(ProcessHandle {
            pid: Some(pid),
            receiver: rx,
            reader_thread: Some(reader_thread),
        })
    }

    fn poll(&self, handle: &RunHandle) -> PollOutcome {
        let RunHandle::Process(h) = handle else {
            panic!("ProcessRunner polled a non-process handle");
        };
        match h.receiver.try_recv() {
            Ok(outcome) => PollOutcome::Done(outcome),
            Err(mpsc::TryRecvError::Empty) => PollOutcome::Running,
            Err(mpsc::TryRecvError::Disconnected) => {
                PollOutcome::Done(Outcome::Crashed("worker process channel closed unexpectedly".into()))
            }
        }
    }

    fn signal_terminate(&self, handle: &RunHandle) {
        let RunHandle::Process(h) = handle else {
            panic!("ProcessRunner signalled a non-process handle");
        };
        if let Some(pid) = h.pid {
            send_signal(pid, Signal::Sigterm);
        }
    }

    fn join(&self, handle: RunHandle, grace: Duration) -> Outcome {
        let RunHandle::Process(mut h) = handle else {
            panic!("ProcessRunner joined a non-process handle");
        };
        match h.receiver.recv_timeout(grace) {
            Ok(outcome) => {
                if let Some(jh) = h.reader_thread.take() {
                    let _ = jh.join();
                }
                outcome
            }
            Err(_) => {
                if let Some(pid) = h.pid {
                    send_signal(pid, Signal::Sigkill);
                }
                let final_wait = h.receiver.recv_timeout(Duration::from_millis(200));
                if let Some(jh) = h.reader_thread.take() {
                    let _ = jh.join();
                }
                match final_wait {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::Terminated,
                }
            }
        }
    }
}

fn immediate(outcome: Outcome) -> RunHandle {
    let (tx, rx) = mpsc::channel();
    let _ = tx.send(outcome);
    RunHandle::Process(ProcessHandle {
        pid: None,
        receiver: rx,
        reader_thread: None,
    })
}

fn read_response(stdout: std::process::ChildStdout, child: &mut std::process::Child) -> Outcome {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) | Err(_) => {
            let stderr = child
                .stderr
                .take()
                .map(|mut s| {
                    let mut buf = String::new();
                    use std::io::Read;
                    let _ = s.read_to_string(&mut buf);
                    buf
                })
                .unwrap_or_default();
            Outcome::Crashed(if stderr.is_empty() {
                "worker process produced no output".to_string()
            } else {
                stderr
            })
        }
        Ok(_) => match serde_json::from_str::<WorkerResponse>(line.trim()) {
            Ok(WorkerResponse::Success { .. }) => Outcome::Success,
            Ok(WorkerResponse::Fail { message }) => Outcome::Failed(message),
            Ok(WorkerResponse::Terminated) => Outcome::Terminated,
            Err(e) => Outcome::Crashed(format!("malformed worker output: {e}")),
        },
    }
}

enum Signal {
    Sigterm,
    Sigkill,
}

#[cfg(unix)]
fn send_signal(pid: i32, signal: Signal) {
    use nix::sys::signal::{self, Signal as NixSignal};
    use nix::unistd::Pid;

    let nix_signal = match signal {
        Signal::Sigterm => NixSignal::SIGTERM,
        Signal::Sigkill => NixSignal::SIGKILL,
    };
    if let Err(e) = signal::kill(Pid::from_raw(pid), nix_signal) {
        tracing::warn!(pid, error = %e, "failed to signal process task");
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: i32, _signal: Signal) {
    tracing::warn!("process task termination signals are only implemented on unix");
}
