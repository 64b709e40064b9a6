use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::condition::eval::SCHEDULER_OWNER;
use crate::condition::EvalContext;
use crate::error::SchedulerError;
use crate::log::{Action, LogRecord};
use crate::runner::{Outcome, PollOutcome, RunHandle};
use crate::task::{SchedulerHandle, Task};

use super::core::{RunningTask, Scheduler, TERMINATION_GRACE};

impl Scheduler {
    /// Runs cycles until the shutdown predicate is true or a fatal
    /// [`SchedulerError`] is raised. Sleeps `min_cycle_interval` between
    /// cycles on the real clock — use [`Scheduler::run_cycle`] directly in
    /// tests that drive a [`crate::time::ManualClock`].
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        loop {
            let should_stop = self.run_cycle()?;
            if should_stop {
                break;
            }
            std::thread::sleep(self.session.settings.min_cycle_interval());
        }
        self.shutdown_outstanding()?;
        Ok(())
    }

    /// Executes one cycle (§4.1) and returns whether the shutdown predicate
    /// now holds. Public so tests can drive cycles one at a time against a
    /// manual clock without relying on real sleeps.
    pub fn run_cycle(&mut self) -> Result<bool, SchedulerError> {
        self.cycle_count += 1;
        let now = self.session.clock.now();
        self.session.log.refresh_snapshot();

        self.start_eligible_tasks(now)?;
        self.enforce_termination(now)?;
        self.harvest_finished()?;

        self.session.log.refresh_snapshot();
        self.evaluate_shutdown(now)
    }

    fn eval_context<'a>(
        &self,
        log: &'a [LogRecord],
        now: DateTime<Utc>,
        owner: &'a str,
        known_tasks: &'a HashSet<String>,
        parameters: &'a crate::condition::Parameters,
    ) -> EvalContext<'a> {
        EvalContext {
            log,
            cycle_count: self.cycle_count,
            started_at: self.started_at,
            now,
            owner,
            known_tasks,
            parameters,
        }
    }

    fn start_eligible_tasks(&mut self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let snapshot = self.session.log.snapshot();
        let known_tasks = self.session.known_task_names();
        let parameters = self.session.parameters_snapshot();

        let mut ordered: Vec<Arc<Task>> = self.session.tasks().to_vec();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        for task in ordered {
            if self.running.contains_key(&task.name) {
                continue;
            }

            let ctx = self.eval_context(&snapshot, now, &task.name, &known_tasks, &parameters);
            let eligible = match task.start_cond.observe(&ctx) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(task_name = %task.name, error = %e, "start condition raised, treating as false");
                    false
                }
            };

            if eligible {
                self.launch_task(&task, now)?;
            } else if self.session.settings.log_inaction {
                self.session
                    .log
                    .append(LogRecord::new(now, task.name.clone(), Action::Inaction))?;
            }
        }
        Ok(())
    }

    fn launch_task(&mut self, task: &Arc<Task>, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.session
            .log
            .append(LogRecord::new(now, task.name.clone(), Action::Run))?;

        let handle_scheduler = SchedulerHandle::new(Arc::clone(&self.session));
        let runner = self.runner_for(task.execution());
        let handle = runner.launch(task, handle_scheduler);

        match handle {
            RunHandle::Inline(outcome) => {
                self.append_terminal_record(&task.name, outcome, now)?;
            }
            other => {
                self.running.insert(
                    task.name.clone(),
                    RunningTask {
                        execution: task.execution(),
                        handle: other,
                        run_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    fn enforce_termination(&mut self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let snapshot = self.session.log.snapshot();
        let known_tasks = self.session.known_task_names();
        let parameters = self.session.parameters_snapshot();

        let mut to_terminate = Vec::new();
        for (name, running) in self.running.iter() {
            let Some(task) = self.session.task_by_name(name) else {
                continue;
            };
            let mut terminate = task.force_termination_requested();
            if !terminate {
                terminate = task
                    .effective_timeout(self.default_timeout)
                    .elapsed_exceeds(now - running.run_at);
            }
            if !terminate {
                if let Some(end_cond) = &task.end_cond {
                    let ctx = self.eval_context(&snapshot, now, name, &known_tasks, &parameters);
                    terminate = match end_cond.observe(&ctx) {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(task_name = %name, error = %e, "end condition raised, treating as false");
                            false
                        }
                    };
                }
            }
            if terminate {
                to_terminate.push(name.clone());
            }
        }

        for name in to_terminate {
            if let Some(task) = self.session.task_by_name(&name) {
                task.clear_force_termination();
            }
            let Some(running) = self.running.remove(&name) else {
                continue;
            };
            let runner = self.runner_for(running.execution);
            runner.signal_terminate(&running.handle);
            // Outcome is discarded: a scheduler-initiated termination is
            // always recorded as `terminate`, even if the runner happened
            // to resolve with success in a narrow race (§9 open question a).
            let _ = runner.join(running.handle, TERMINATION_GRACE);
            self.session
                .log
                .append(LogRecord::new(now, name, Action::Terminate))?;
        }
        Ok(())
    }

    fn harvest_finished(&mut self) -> Result<(), SchedulerError> {
        let names: Vec<String> = self.running.keys().cloned().collect();
        for name in names {
            let Some(running) = self.running.get(&name) else {
                continue;
            };
            let runner = self.runner_for(running.execution);
            if let PollOutcome::Done(outcome) = runner.poll(&running.handle) {
                self.running.remove(&name);
                let now = self.session.clock.now();
                self.append_terminal_record(&name, outcome, now)?;
            }
        }
        Ok(())
    }

    fn append_terminal_record(
        &mut self,
        task_name: &str,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        // exc_text carries the task name alongside the failure message (§8
        // scenario 4) so a reader scanning `fail`/`crash` records in
        // isolation — e.g. after filtering by action only — doesn't have to
        // cross-reference the structured `task_name` field to know which
        // task produced which error text.
        let record = match outcome {
            Outcome::Success => LogRecord::new(now, task_name, Action::Success),
            Outcome::Failed(msg) => {
                LogRecord::new(now, task_name, Action::Fail).with_exc_text(format!("{task_name}: {msg}"))
            }
            Outcome::Terminated => LogRecord::new(now, task_name, Action::Terminate),
            Outcome::Crashed(msg) => {
                LogRecord::new(now, task_name, Action::Crash).with_exc_text(format!("{task_name}: {msg}"))
            }
        };
        self.session.log.append(record)?;
        Ok(())
    }

    fn evaluate_shutdown(&self, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let snapshot = self.session.log.snapshot();
        let known_tasks = self.session.known_task_names();
        let parameters = self.session.parameters_snapshot();
        let ctx = self.eval_context(&snapshot, now, SCHEDULER_OWNER, &known_tasks, &parameters);
        match self.shut_condition.observe(&ctx) {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(error = %e, "shutdown condition raised, treating as false");
                Ok(false)
            }
        }
    }

    /// Signals every still-running task to terminate, waits up to the grace
    /// period per execution model, and appends terminal records for each
    /// (§4.1 exit path).
    fn shutdown_outstanding(&mut self) -> Result<(), SchedulerError> {
        let names: Vec<String> = self.running.keys().cloned().collect();
        let now = self.session.clock.now();
        for name in names {
            if let Some(task) = self.session.task_by_name(&name) {
                task.clear_force_termination();
            }
            let Some(running) = self.running.remove(&name) else {
                continue;
            };
            let runner = self.runner_for(running.execution);
            runner.signal_terminate(&running.handle);
            let _ = runner.join(running.handle, TERMINATION_GRACE);
            self.session
                .log
                .append(LogRecord::new(now, name, Action::Terminate))?;
        }
        Ok(())
    }
}
