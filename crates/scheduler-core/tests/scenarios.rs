//! End-to-end scenarios exercising the scheduler loop against real
//! `std::thread`/`std::process` runners: timeout handling, forced
//! termination, process-task failure reporting, parameter masking, and
//! priority ordering.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use scheduler_core::condition::Condition;
use scheduler_core::config::SchedulerSettings;
use scheduler_core::log::{Action, LogFilter};
use scheduler_core::session::Session;
use scheduler_core::task::{Parameters, Task, TaskBody};
use scheduler_core::tasks::builtin;
use scheduler_core::time::{parse_time_string, shared_system_clock, Timeout};
use scheduler_core::Scheduler;

fn worker_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_scheduler-worker"))
}

fn count(session: &Session, task_name: &str, action: Action) -> usize {
    let mut actions = HashSet::new();
    actions.insert(action);
    session
        .read_task_logs(&LogFilter {
            task_name: Some(task_name.to_string()),
            actions: Some(actions),
            ..Default::default()
        })
        .len()
}

fn settings_with(default_timeout: &str) -> SchedulerSettings {
    let mut settings = SchedulerSettings::default();
    settings.min_cycle_interval_ms = 1;
    settings.default_timeout = default_timeout.to_string();
    settings
}

/// Scenario 1: a task with its own `timeout = "never"` is not terminated
/// even though the scheduler's default timeout is far shorter than the
/// task's run time.
#[test]
fn no_timeout_slow_task_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("slow.done");

    let mut session = Session::new(shared_system_clock(), settings_with("0.02 seconds"));
    let slow_body = builtin::sleep_and_write_file(Duration::from_millis(60), marker.clone());
    let slow = Task::new(
        "slow",
        TaskBody::Threaded(slow_body),
        Condition::AlwaysTrue,
        Some(Timeout::Never),
        0,
        Parameters::new(),
    );
    session.register_task(slow).unwrap();

    let session = Arc::new(session);
    let shut = Condition::TaskFinished("slow".to_string()).at_least(2);
    let mut scheduler = Scheduler::new(Arc::clone(&session), shut, worker_binary());
    scheduler.run().expect("scheduler run should not error");

    assert!(count(&session, "slow", Action::Run) >= 2);
    assert_eq!(count(&session, "slow", Action::Terminate), 0);
    assert!(count(&session, "slow", Action::Success) >= 2);
    assert!(marker.exists());
}

/// Scenario 2: a task that does not set its own timeout inherits the
/// scheduler's `default_timeout` and is terminated before it can finish.
#[test]
fn task_without_own_timeout_inherits_scheduler_default_and_is_terminated() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("slow.done");

    let mut session = Session::new(shared_system_clock(), settings_with("0.05 seconds"));
    let slow_body = builtin::sleep_and_write_file(Duration::from_millis(500), marker.clone());
    let slow = Task::new(
        "slow",
        TaskBody::Threaded(slow_body),
        Condition::AlwaysTrue,
        None, // inherits the scheduler's default_timeout
        0,
        Parameters::new(),
    );
    session.register_task(slow).unwrap();

    let session = Arc::new(session);
    let shut = Condition::TaskStarted("slow".to_string()).at_least(2);
    let mut scheduler = Scheduler::new(Arc::clone(&session), shut, worker_binary());
    scheduler.run().expect("scheduler run should not error");

    assert_eq!(count(&session, "slow", Action::Run), 2);
    assert_eq!(count(&session, "slow", Action::Terminate), 2);
    assert_eq!(count(&session, "slow", Action::Success), 0);
    assert!(!marker.exists());
}

/// Scenario 3: an inline "terminator" task forces the slow task to
/// terminate via `force_termination`, and the scheduler clears the flag
/// after acting on it.
#[test]
fn external_force_termination_clears_flag_after_acting() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("slow.done");

    let mut session = Session::new(shared_system_clock(), settings_with("never"));
    let slow_body = builtin::sleep_and_write_file(Duration::from_millis(200), marker.clone());
    let slow = Task::new(
        "slow",
        TaskBody::Threaded(slow_body),
        Condition::AlwaysTrue,
        Some(Timeout::Never),
        0,
        Parameters::new(),
    );
    session.register_task(slow).unwrap();

    let terminator_body = builtin::terminator_for("slow");
    let terminator = Task::new(
        "terminator",
        TaskBody::Inline(terminator_body),
        Condition::TaskStarted("slow".to_string()),
        Some(Timeout::Never),
        10,
        Parameters::new(),
    );
    session.register_task(terminator).unwrap();

    let session = Arc::new(session);
    let shut = Condition::TaskStarted("slow".to_string()).at_least(2);
    let mut scheduler = Scheduler::new(Arc::clone(&session), shut, worker_binary());
    scheduler.run().expect("scheduler run should not error");

    assert_eq!(count(&session, "slow", Action::Run), 2);
    assert_eq!(count(&session, "slow", Action::Terminate), 2);
    assert!(!marker.exists());

    let slow_task = session.task_by_name("slow").unwrap();
    assert!(!slow_task.force_termination_requested());
}

/// Scenario 4: a registered process task that always fails produces `fail`
/// records with the failure text captured from the child, not a `crash`.
#[test]
fn process_task_failure_is_recorded_with_exc_text() {
    let mut session = Session::new(shared_system_clock(), settings_with("never"))
        .with_process_registry(builtin::demo_registry());
    let flaky = Task::new(
        "flaky",
        TaskBody::Process {
            registered_name: "always_fail".to_string(),
        },
        Condition::AlwaysTrue,
        Some(parse_time_string("5 seconds").unwrap()),
        0,
        Parameters::new(),
    );
    session.register_task(flaky).unwrap();

    let session = Arc::new(session);
    let shut = Condition::TaskStarted("flaky".to_string()).at_least(3);
    let mut scheduler = Scheduler::new(Arc::clone(&session), shut, worker_binary());
    scheduler.run().expect("scheduler run should not error");

    assert_eq!(count(&session, "flaky", Action::Run), 3);
    let mut fail_actions = HashSet::new();
    fail_actions.insert(Action::Fail);
    let fails = session.read_task_logs(&LogFilter {
        task_name: Some("flaky".to_string()),
        actions: Some(fail_actions),
        ..Default::default()
    });
    assert_eq!(fails.len(), 3);
    for record in &fails {
        let text = record.exc_text.as_deref().unwrap_or_default();
        assert!(text.contains("failed by design"), "got: {text}");
        assert!(text.contains("flaky"), "exc_text should name the task: got: {text}");
    }
    assert_eq!(count(&session, "flaky", Action::Crash), 0);
}

/// Private parameters never render unmasked through the read-API surface,
/// regardless of execution model.
#[test]
fn private_parameters_never_appear_unmasked() {
    use scheduler_core::task::ParamValue;

    let mut session = Session::new(shared_system_clock(), settings_with("never"));
    let mut params = Parameters::new();
    params.insert(
        "api_key".to_string(),
        ParamValue::Private(serde_json::json!("super-secret")),
    );
    params.insert(
        "retries".to_string(),
        ParamValue::Plain(serde_json::json!(3)),
    );
    let task = Task::new(
        "configured",
        TaskBody::Inline(builtin::terminator_for("nobody")),
        Condition::AlwaysFalse,
        Some(Timeout::Never),
        0,
        params,
    );
    session.register_task(task).unwrap();
    session.set_parameter(
        "global_secret",
        ParamValue::Private(serde_json::json!("zzz")),
    );

    let tasks = session.list_tasks();
    let summary = &tasks["configured"];
    assert_eq!(
        summary.parameters.get("api_key"),
        Some(&serde_json::json!("*****"))
    );
    assert_eq!(
        summary.parameters.get("retries"),
        Some(&serde_json::json!(3))
    );

    let params_view = session.list_parameters();
    assert_eq!(
        params_view.get("global_secret"),
        Some(&serde_json::json!("*****"))
    );
}

/// Priority ordering: when two tasks are simultaneously eligible, the
/// higher-priority one is launched first within the same cycle — observed
/// indirectly via `DependSuccess` requiring the dependency's run to precede
/// the dependent's evaluation within the same snapshot-refresh boundary.
#[test]
fn higher_priority_task_is_evaluated_before_lower_priority_task() {
    let mut session = Session::new(shared_system_clock(), settings_with("never"));

    let high = Task::new(
        "high",
        TaskBody::Inline(builtin::noop_inline()),
        Condition::AlwaysTrue,
        Some(Timeout::Never),
        10,
        Parameters::new(),
    );
    let low = Task::new(
        "low",
        TaskBody::Inline(builtin::noop_inline()),
        Condition::AlwaysTrue,
        Some(Timeout::Never),
        0,
        Parameters::new(),
    );
    session.register_task(low).unwrap();
    session.register_task(high).unwrap();

    let session = Arc::new(session);
    let shut = Condition::TaskStarted("low".to_string()).at_least(1);
    let mut scheduler = Scheduler::new(Arc::clone(&session), shut, worker_binary());
    scheduler.run().expect("scheduler run should not error");

    let all = session.read_task_logs(&LogFilter::default());
    let high_index = all.iter().position(|r| r.task_name == "high").unwrap();
    let low_index = all.iter().position(|r| r.task_name == "low").unwrap();
    assert!(high_index < low_index, "higher priority task should be logged first");
}
