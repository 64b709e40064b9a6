pub mod eval;

pub use eval::EvalContext;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ConditionError;

/// A composable boolean predicate over session state and log history.
///
/// Built from atoms and combinators; evaluated with [`Condition::observe`]
/// against an [`EvalContext`] snapshot. Evaluation never mutates state.
#[derive(Debug, Clone)]
pub enum Condition {
    AlwaysTrue,
    AlwaysFalse,
    TaskStarted(String),
    TaskFinished(String),
    TaskSucceeded(String),
    TaskFailed(String),
    TaskRunning(String),
    DependSuccess(String),
    SchedulerCycles,
    SchedulerStarted,
    IsParameter(String, Value),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    AtLeast(Box<Condition>, u64),
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Condition {
        Condition::Not(Box::new(self))
    }

    /// Explicit counting combinator, e.g. "task T has started at least 2
    /// times" (§4.2).
    pub fn at_least(self, n: u64) -> Condition {
        Condition::AtLeast(Box::new(self), n)
    }

    pub fn observe(&self, ctx: &EvalContext) -> Result<bool, ConditionError> {
        eval::evaluate(self, ctx)
    }
}

pub type Parameters = HashMap<String, crate::task::ParamValue>;
