//! Companion binary for out-of-process task execution (§4.3, §9 "Pickled
//! process tasks"). Reads one JSON request line from stdin, resolves the
//! named task in the shared demo registry, runs it, and writes one JSON
//! response line to stdout.
use std::io::{self, BufRead, Write};

use scheduler_core::error::TaskFailure;
use scheduler_core::runner::protocol::{WorkerRequest, WorkerResponse};
use scheduler_core::tasks::builtin::demo_registry;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let stdin = io::stdin();
    let mut line = String::new();
    if let Err(e) = stdin.lock().read_line(&mut line) {
        respond(WorkerResponse::Fail {
            message: format!("failed to read request: {e}"),
        });
        std::process::exit(1);
    }

    let request: WorkerRequest = match serde_json::from_str(line.trim()) {
        Ok(r) => r,
        Err(e) => {
            respond(WorkerResponse::Fail {
                message: format!("malformed request: {e}"),
            });
            std::process::exit(1);
        }
    };

    let registry = demo_registry();
    let response = match registry.invoke(&request.task, request.params) {
        Ok(value) => WorkerResponse::Success { value },
        Err(TaskFailure::Failed(message)) => WorkerResponse::Fail { message },
        Err(TaskFailure::Terminated) => WorkerResponse::Terminated,
    };
    respond(response);
}

fn respond(response: WorkerResponse) {
    let line = serde_json::to_string(&response).expect("response always serializable");
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let _ = writeln!(handle, "{line}");
}
