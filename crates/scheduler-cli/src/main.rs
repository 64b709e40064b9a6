//! `scheduler-cli` — headless runner binary (§2.9, §6).
//!
//! Builds a [`Session`], registers a small demo task set, runs the
//! scheduler to completion, and exits with the codes from §6. This is not
//! a rich operator-facing CLI front-end — it is the minimal process entry
//! point every headless Rust service needs.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use scheduler_core::condition::Condition;
use scheduler_core::config::SchedulerSettings;
use scheduler_core::error::ConfigError;
use scheduler_core::session::Session;
use scheduler_core::task::{ParamValue, Task, TaskBody};
use scheduler_core::tasks::builtin;
use scheduler_core::time::{parse_time_string, shared_system_clock};
use scheduler_core::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "scheduler-cli", version, about)]
struct Cli {
    /// Path to a scheduler.toml settings file (§3.7). Missing is fine;
    /// malformed is fatal.
    #[arg(long, env = "SCHEDULER_CONFIG", default_value = "scheduler.toml")]
    config: PathBuf,

    /// Number of `slow_task` completions to wait for before shutting down.
    #[arg(long, default_value_t = 1)]
    until_successes: u64,

    /// Path to the `scheduler-worker` companion binary. Defaults to the
    /// sibling of this executable.
    #[arg(long)]
    worker_binary: Option<PathBuf>,

    /// Directory the demo `slow_task` writes its completion marker into.
    #[arg(long, default_value = "scheduler-demo")]
    workdir: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let exit_code = match run() {
        Ok(()) => 0,
        Err(e) => {
            if e.downcast_ref::<ConfigError>().is_some() {
                error!(error = %e, "configuration error, exiting");
                2
            } else {
                error!(error = %e, "scheduler error, exiting");
                1
            }
        }
    };
    std::process::exit(exit_code);
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = SchedulerSettings::load(&cli.config)?;
    info!(config = %cli.config.display(), "settings loaded");

    let mut session = Session::new(shared_system_clock(), settings)
        .with_process_registry(builtin::demo_registry());
    register_demo_tasks(&mut session, &cli.workdir)?;

    let session = Arc::new(session);
    let worker_binary = cli.worker_binary.unwrap_or_else(default_worker_binary);
    let shut_condition = Condition::TaskFinished("slow_task".to_string()).at_least(cli.until_successes);

    let mut scheduler = Scheduler::new(Arc::clone(&session), shut_condition, worker_binary);
    scheduler.run()?;

    info!(cycles = scheduler.cycle_count(), "scheduler exited");
    Ok(())
}

fn default_worker_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("scheduler-cli"));
    path.pop();
    path.push(if cfg!(windows) {
        "scheduler-worker.exe"
    } else {
        "scheduler-worker"
    });
    path
}

/// A small self-contained task graph exercising all three execution models,
/// used both as a working demo and as the grounding for §8's scenarios.
fn register_demo_tasks(session: &mut Session, workdir: &std::path::Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(workdir).map_err(ConfigError::Io)?;

    let marker = workdir.join("slow_task.done");
    let slow_body = builtin::sleep_and_write_file(Duration::from_millis(50), marker);
    let slow_task = Task::new(
        "slow_task",
        TaskBody::Threaded(slow_body),
        Condition::AlwaysTrue,
        Some(parse_time_string("10 seconds")?),
        0,
        Default::default(),
    );
    session.register_task(slow_task)?;

    let mut flaky_params = scheduler_core::task::Parameters::new();
    flaky_params.insert("attempt".to_string(), ParamValue::Plain(serde_json::json!(1)));
    let flaky_task = Task::new(
        "flaky_task",
        TaskBody::Process {
            registered_name: "always_fail".to_string(),
        },
        Condition::TaskStarted("slow_task".to_string()),
        Some(parse_time_string("5 seconds")?),
        -1,
        flaky_params,
    );
    session.register_task(flaky_task)?;

    let watchdog_body = builtin::terminator_for("flaky_task");
    let watchdog = Task::new(
        "watchdog",
        TaskBody::Inline(watchdog_body),
        Condition::TaskFailed("flaky_task".to_string()),
        Some(parse_time_string("never")?),
        5,
        Default::default(),
    );
    session.register_task(watchdog)?;

    Ok(())
}
