//! Condition folding.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::conditions::Operator;
use crate::error::AlertingError;

use super::EvalContext;

/// Evaluates a rule's conditions into an [`EvalContext`].
///
/// Implementations record failures in `ctx.error` rather than returning
/// them; callers must check it before trusting `firing`/`no_data_found`.
#[async_trait]
pub trait EvalHandler: Send + Sync {
    async fn eval(&self, ctx: &mut EvalContext);
}

/// Folds the ordered condition list left to right.
///
/// The first condition seeds the verdict; every later condition combines
/// with it using its own operator (`or`, anything else is AND). The first
/// condition error stops the fold.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEvalHandler;

#[async_trait]
impl EvalHandler for DefaultEvalHandler {
    async fn eval(&self, ctx: &mut EvalContext) {
        let rule = Arc::clone(&ctx.rule);
        let mut firing = false;
        let mut no_data_found = false;
        let mut trace = String::new();

        for (index, entry) in rule.conditions.iter().enumerate() {
            let operator = entry.operator;
            let result = match entry.condition.eval(ctx).await {
                Ok(result) => result,
                Err(source) => {
                    debug!(rule_id = %rule.id, index, error = %source, "condition failed");
                    ctx.error = Some(AlertingError::Condition { index, source });
                    break;
                }
            };

            if index == 0 {
                firing = result.firing;
                no_data_found = result.no_data_found;
            }

            match operator {
                Operator::Or => {
                    firing = firing || result.firing;
                    no_data_found = no_data_found || result.no_data_found;
                }
                Operator::And => {
                    firing = firing && result.firing;
                    no_data_found = no_data_found && result.no_data_found;
                }
            }

            trace = if index == 0 {
                firing.to_string()
            } else {
                format!("[{} {} {}]", trace, operator, result.firing)
            };

            if ctx.is_logging() {
                ctx.log(format!(
                    "Condition[{index}]: firing={}, no_data={}, operator={}, matches={}",
                    result.firing,
                    result.no_data_found,
                    operator,
                    result.eval_matches.len()
                ));
            }

            ctx.eval_matches.extend(result.eval_matches);
            ctx.alert_ok_eval_matches.extend(result.alert_ok_eval_matches);
        }

        ctx.condition_evals = if trace.is_empty() {
            firing.to_string()
        } else {
            format!("{trace} = {firing}")
        };
        ctx.firing = firing;
        ctx.no_data_found = no_data_found;
        ctx.end_time = Some(Utc::now());

        if ctx.is_logging() {
            let line = format!("Conditions: {}", ctx.condition_evals);
            ctx.log(line);
        }
    }
}
