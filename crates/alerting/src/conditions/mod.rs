//! Condition trait, per-condition results, and the condition registry.

mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cloudmon_core::EvalMatch;

use crate::error::ConditionError;
use crate::eval::EvalContext;

pub use registry::{ConditionFactory, ConditionRegistry};

/// How a condition combines with the conditions before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    And,
    Or,
}

impl Operator {
    /// Parse an operator; anything other than `or` is treated as AND.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("or") {
            Operator::Or
        } else {
            Operator::And
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one condition, consumed by the evaluation fold.
#[derive(Debug, Clone, Default)]
pub struct ConditionResult {
    pub firing: bool,
    pub no_data_found: bool,
    pub eval_matches: Vec<EvalMatch>,
    /// Series that went back to normal on this evaluation.
    pub alert_ok_eval_matches: Vec<EvalMatch>,
}

/// One boolean/threshold check against a datasource.
///
/// Conditions may fail transiently; the dispatcher retries the whole
/// evaluation. Long-running conditions should watch
/// [`EvalContext::cancellation`] and bail out with
/// [`ConditionError::Cancelled`].
#[async_trait]
pub trait Condition: Send + Sync {
    async fn eval(&self, ctx: &EvalContext) -> Result<ConditionResult, ConditionError>;
}

/// A condition in a rule together with how it combines with the conditions
/// before it.
#[derive(Clone)]
pub struct RuleCondition {
    pub operator: Operator,
    pub condition: Arc<dyn Condition>,
}

impl RuleCondition {
    pub fn new(operator: Operator, condition: Arc<dyn Condition>) -> Self {
        Self {
            operator,
            condition,
        }
    }
}

impl fmt::Debug for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleCondition")
            .field("operator", &self.operator)
            .finish_non_exhaustive()
    }
}
