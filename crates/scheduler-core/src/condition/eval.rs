use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::ConditionError;
use crate::log::{Action, LogRecord};

use super::{Condition, Parameters};

/// A sentinel owner name used when evaluating the scheduler's own shutdown
/// condition, which has no owning task.
pub const SCHEDULER_OWNER: &str = "__scheduler__";

/// Everything [`Condition::observe`] needs: a log snapshot (never the live
/// stream — callers decide when to refresh it), the cycle counter, the
/// owning task (for `DependSuccess`), and the known task set (to raise
/// [`ConditionError::UnknownTask`] rather than silently treating an unknown
/// name as "never happened").
pub struct EvalContext<'a> {
    pub log: &'a [LogRecord],
    pub cycle_count: u64,
    pub started_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub owner: &'a str,
    pub known_tasks: &'a HashSet<String>,
    pub parameters: &'a Parameters,
}

pub(super) fn evaluate(cond: &Condition, ctx: &EvalContext) -> Result<bool, ConditionError> {
    match cond {
        Condition::AlwaysTrue => Ok(true),
        Condition::AlwaysFalse => Ok(false),
        Condition::TaskStarted(name) => Ok(count_action(ctx, name, |a| a == Action::Run) >= 1),
        Condition::TaskFinished(name) => Ok(count_action(ctx, name, Action::is_terminal) >= 1),
        Condition::TaskSucceeded(name) => {
            Ok(count_action(ctx, name, |a| a == Action::Success) >= 1)
        }
        Condition::TaskFailed(name) => {
            Ok(count_action(ctx, name, |a| matches!(a, Action::Fail | Action::Crash)) >= 1)
        }
        Condition::TaskRunning(name) => Ok(is_running(ctx, name)),
        Condition::DependSuccess(depends_on) => depend_success(ctx, depends_on),
        Condition::SchedulerCycles => Ok(ctx.cycle_count >= 1),
        Condition::SchedulerStarted => Ok(true),
        Condition::IsParameter(name, expected) => Ok(is_parameter(ctx, name, expected)),
        Condition::And(a, b) => {
            if !evaluate(a, ctx)? {
                return Ok(false);
            }
            evaluate(b, ctx)
        }
        Condition::Or(a, b) => {
            if evaluate(a, ctx)? {
                return Ok(true);
            }
            evaluate(b, ctx)
        }
        Condition::Not(inner) => Ok(!evaluate(inner, ctx)?),
        Condition::AtLeast(inner, n) => at_least(inner, *n, ctx),
    }
}

fn count_action(ctx: &EvalContext, task_name: &str, pred: impl Fn(Action) -> bool) -> u64 {
    ctx.log
        .iter()
        .filter(|r| r.task_name == task_name && pred(r.action))
        .count() as u64
}

fn is_running(ctx: &EvalContext, task_name: &str) -> bool {
    ctx.log
        .iter()
        .rev()
        .find(|r| r.task_name == task_name)
        .map(|r| r.action == Action::Run)
        .unwrap_or(false)
}

fn depend_success(ctx: &EvalContext, depends_on: &str) -> Result<bool, ConditionError> {
    if !ctx.known_tasks.contains(depends_on) {
        return Err(ConditionError::UnknownTask(depends_on.to_string()));
    }
    let lower_bound = ctx
        .log
        .iter()
        .filter(|r| r.task_name == ctx.owner && r.action == Action::Run)
        .map(|r| r.created)
        .max();

    match lower_bound {
        // Owner has run before: only its most recent run anchors the window —
        // A must have terminated in success since then (§4.2).
        Some(lb) => {
            let most_recent_terminal = ctx
                .log
                .iter()
                .filter(|r| r.task_name == depends_on && r.action.is_terminal() && r.created > lb)
                .max_by_key(|r| r.created);
            Ok(most_recent_terminal
                .map(|r| r.action == Action::Success)
                .unwrap_or(false))
        }
        // Owner has not run this session: the window is unbounded, so any
        // success of A since scheduler start satisfies the condition, even if
        // A has since failed or terminated again (§4.2).
        None => Ok(ctx
            .log
            .iter()
            .any(|r| r.task_name == depends_on && r.action == Action::Success)),
    }
}

fn is_parameter(ctx: &EvalContext, name: &str, expected: &serde_json::Value) -> bool {
    ctx.parameters
        .get(name)
        .map(|v| v.raw() == expected)
        .unwrap_or(false)
}

/// Counting wrapper. `TaskStarted`/`TaskFinished`/`SchedulerCycles` have a
/// natural count (see §4.2); any other wrapped condition is degenerate and
/// counts as 1 if currently true, 0 otherwise.
fn at_least(inner: &Condition, n: u64, ctx: &EvalContext) -> Result<bool, ConditionError> {
    let count = match inner {
        Condition::TaskStarted(name) => count_action(ctx, name, |a| a == Action::Run),
        Condition::TaskFinished(name) => count_action(ctx, name, Action::is_terminal),
        Condition::TaskSucceeded(name) => count_action(ctx, name, |a| a == Action::Success),
        Condition::TaskFailed(name) => {
            count_action(ctx, name, |a| matches!(a, Action::Fail | Action::Crash))
        }
        Condition::SchedulerCycles => ctx.cycle_count,
        other => u64::from(evaluate(other, ctx)?),
    };
    Ok(count >= n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogRecord;
    use std::collections::HashMap;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn ctx<'a>(log: &'a [LogRecord], cycle: u64, known: &'a HashSet<String>, params: &'a Parameters) -> EvalContext<'a> {
        EvalContext {
            log,
            cycle_count: cycle,
            started_at: t(0),
            now: t(1000),
            owner: "b",
            known_tasks: known,
            parameters: params,
        }
    }

    #[test]
    fn and_or_not_short_circuit_semantics() {
        let log = vec![];
        let known = HashSet::new();
        let params = HashMap::new();
        let c = ctx(&log, 0, &known, &params);

        assert!(Condition::AlwaysTrue
            .and(Condition::AlwaysTrue)
            .observe(&c)
            .unwrap());
        assert!(!Condition::AlwaysTrue
            .and(Condition::AlwaysFalse)
            .observe(&c)
            .unwrap());
        assert!(Condition::AlwaysFalse
            .or(Condition::AlwaysTrue)
            .observe(&c)
            .unwrap());
        assert!(Condition::AlwaysFalse.not().observe(&c).unwrap());
    }

    #[test]
    fn task_started_at_least_counts_runs() {
        let log = vec![
            LogRecord::new(t(0), "a", Action::Run),
            LogRecord::new(t(1), "a", Action::Success),
            LogRecord::new(t(2), "a", Action::Run),
            LogRecord::new(t(3), "a", Action::Success),
        ];
        let known = HashSet::new();
        let params = HashMap::new();
        let c = ctx(&log, 0, &known, &params);
        assert!(Condition::TaskStarted("a".into()).at_least(2).observe(&c).unwrap());
        assert!(!Condition::TaskStarted("a".into()).at_least(3).observe(&c).unwrap());
    }

    #[test]
    fn depend_success_unknown_task_errors() {
        let log = vec![];
        let known = HashSet::new();
        let params = HashMap::new();
        let c = ctx(&log, 0, &known, &params);
        let err = Condition::DependSuccess("a".into()).observe(&c).unwrap_err();
        assert!(matches!(err, ConditionError::UnknownTask(name) if name == "a"));
    }

    #[test]
    fn depend_success_true_after_success_before_dependent_reruns() {
        let log = vec![
            LogRecord::new(t(0), "b", Action::Run),
            LogRecord::new(t(1), "b", Action::Success),
            LogRecord::new(t(2), "a", Action::Run),
            LogRecord::new(t(3), "a", Action::Success),
        ];
        let mut known = HashSet::new();
        known.insert("a".to_string());
        let params = HashMap::new();
        let c = ctx(&log, 0, &known, &params);
        assert!(Condition::DependSuccess("a".into()).observe(&c).unwrap());
    }

    #[test]
    fn depend_success_true_when_b_never_ran_and_a_succeeded_then_later_failed() {
        let log = vec![
            LogRecord::new(t(0), "a", Action::Run),
            LogRecord::new(t(1), "a", Action::Success),
            LogRecord::new(t(2), "a", Action::Run),
            LogRecord::new(t(3), "a", Action::Fail),
        ];
        let mut known = HashSet::new();
        known.insert("a".to_string());
        let params = HashMap::new();
        let c = ctx(&log, 0, &known, &params);
        assert!(Condition::DependSuccess("a".into()).observe(&c).unwrap());
    }

    #[test]
    fn depend_success_false_when_a_fails_after_bs_last_run() {
        let log = vec![
            LogRecord::new(t(0), "b", Action::Run),
            LogRecord::new(t(1), "b", Action::Success),
            LogRecord::new(t(2), "a", Action::Run),
            LogRecord::new(t(3), "a", Action::Fail),
        ];
        let mut known = HashSet::new();
        known.insert("a".to_string());
        let params = HashMap::new();
        let c = ctx(&log, 0, &known, &params);
        assert!(!Condition::DependSuccess("a".into()).observe(&c).unwrap());
    }
}
