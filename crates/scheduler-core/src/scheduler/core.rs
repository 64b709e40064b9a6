use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::condition::Condition;
use crate::runner::{InlineRunner, ProcessRunner, Runner, RunHandle, ThreadedRunner};
use crate::session::Session;
use crate::task::Execution;
use crate::time::Timeout;

/// Grace period given to a task between a termination request and the
/// scheduler deciding to escalate (`SIGKILL` for processes) or simply
/// record it terminated and move on (threads). Not user-configurable —
/// the `SchedulerSettings` surface in §3.7 only exposes cycle pacing and
/// logging knobs.
pub(super) const TERMINATION_GRACE: Duration = Duration::from_millis(500);

pub(super) struct RunningTask {
    pub execution: Execution,
    pub handle: RunHandle,
    pub run_at: DateTime<Utc>,
}

/// Coordinates cycle execution, start gating, timeout enforcement, forced
/// termination, and shutdown predicate evaluation over a [`Session`]'s
/// registered tasks (§3.6, §4.1).
pub struct Scheduler {
    pub(super) session: Arc<Session>,
    pub(super) shut_condition: Condition,
    pub(super) cycle_count: u64,
    pub(super) started_at: DateTime<Utc>,
    pub(super) running: HashMap<String, RunningTask>,
    pub(super) default_timeout: Timeout,
    pub(super) inline_runner: InlineRunner,
    pub(super) threaded_runner: ThreadedRunner,
    pub(super) process_runner: ProcessRunner,
}

impl Scheduler {
    pub fn new(session: Arc<Session>, shut_condition: Condition, worker_binary: PathBuf) -> Self {
        let started_at = session.clock.now();
        // Settings are validated at load time (§3.7), so this only fails for
        // a `SchedulerSettings` built by hand with a bad string — fall back
        // to `Never` rather than panicking in the constructor.
        let default_timeout = session.settings.default_timeout().unwrap_or(Timeout::Never);
        Self {
            session,
            shut_condition,
            cycle_count: 0,
            started_at,
            running: HashMap::new(),
            default_timeout,
            inline_runner: InlineRunner,
            threaded_runner: ThreadedRunner,
            process_runner: ProcessRunner::new(worker_binary),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub(super) fn runner_for(&self, execution: Execution) -> &dyn Runner {
        match execution {
            Execution::Inline => &self.inline_runner,
            Execution::Threaded => &self.threaded_runner,
            Execution::Process => &self.process_runner,
        }
    }
}
