//! One-off rule evaluation outside the scheduler.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::AlertingError;
use crate::rule::Rule;

use super::{EvalContext, EvalHandler};

/// Evaluates a rule once and reports what its new state would be, without
/// persisting anything or sending notifications.
pub struct RuleTester {
    eval_handler: Arc<dyn EvalHandler>,
    timeout: Duration,
}

impl RuleTester {
    pub fn new(eval_handler: Arc<dyn EvalHandler>, timeout: Duration) -> Self {
        Self {
            eval_handler,
            timeout,
        }
    }

    pub async fn test_rule(&self, rule: Arc<Rule>, is_debug: bool) -> EvalContext {
        let mut ctx = EvalContext::for_test_run(rule, is_debug);

        if tokio::time::timeout(self.timeout, self.eval_handler.eval(&mut ctx))
            .await
            .is_err()
        {
            ctx.error = Some(AlertingError::EvalTimeout(self.timeout));
        }

        let new_state = ctx.apply_new_state();
        let line = match &ctx.error {
            Some(e) => format!("New state: {new_state} (error: {e})"),
            None => format!("New state: {new_state}"),
        };
        ctx.log(line);

        info!(
            rule_id = %ctx.rule.id,
            new_state = %new_state,
            duration_ms = ctx.duration().as_millis() as u64,
            "rule test completed"
        );
        ctx
    }
}
