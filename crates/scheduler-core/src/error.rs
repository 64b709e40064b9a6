use thiserror::Error;

/// Top-level failure modes for the scheduler loop itself.
///
/// User task failures never reach this enum — they are captured as
/// `fail`/`crash` log records instead (see [`crate::task::TaskFailure`]).
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("condition error: {0}")]
    Condition(#[from] ConditionError),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("malformed time string: {0:?}")]
    BadTimeString(String),

    #[error("duplicate task name: {0}")]
    DuplicateTask(String),

    #[error("unknown execution model: {0:?}")]
    UnknownExecution(String),

    #[error("malformed settings file: {0}")]
    MalformedFile(String),

    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConditionError {
    #[error("unknown task referenced in condition: {0}")]
    UnknownTask(String),

    #[error("unknown parameter referenced in condition: {0}")]
    UnknownParameter(String),
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to append log record after retry: {0}")]
    AppendFailed(String),
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to spawn process task: {0}")]
    SpawnFailed(String),

    #[error("child process produced unparsable output: {0}")]
    MalformedOutput(String),

    #[error("task name is not registered in the process task registry: {0}")]
    UnknownProcessTask(String),
}

/// Returned by user task callables. Distinguishes an ordinary failure from
/// the well-known cooperative-cancellation sentinel so the scheduler never
/// confuses a termination with a failure.
#[derive(Error, Debug, Clone)]
pub enum TaskFailure {
    #[error("{0}")]
    Failed(String),

    #[error("task terminated")]
    Terminated,
}
