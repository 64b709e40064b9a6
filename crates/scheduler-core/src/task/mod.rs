mod context;
mod model;
mod registry;

pub use context::{CancellationToken, SchedulerHandle, TaskContext};
pub use model::{Execution, InlineFn, ParamValue, Parameters, Task, TaskBody, TaskStatus};
pub use registry::{ProcessTaskFn, ProcessTaskRegistry};
