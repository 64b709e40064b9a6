use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request written to a `scheduler-worker` child's stdin as a single JSON
/// line.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub task: String,
    pub params: Value,
}

/// Response read back from a `scheduler-worker` child's stdout as a single
/// JSON line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerResponse {
    Success { value: Value },
    Fail { message: String },
    Terminated,
}
