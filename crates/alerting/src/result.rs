//! Persists evaluation outcomes and triggers notifications.

use std::sync::Arc;

use async_trait::async_trait;
use cloudmon_core::AlertState;
use tracing::{error, info};

use crate::error::AlertingError;
use crate::eval::EvalContext;
use crate::model::{AlertRecord, SetAlertState};
use crate::notification::NotificationService;
use crate::store::ModelStore;

/// Consumes a finished [`EvalContext`].
///
/// On success `ctx.rule_state` holds the state to commit back to the job.
#[async_trait]
pub trait ResultHandler: Send + Sync {
    /// Handle a successful evaluation: persist a state change and notify.
    async fn handle(&self, ctx: &mut EvalContext) -> Result<(), AlertingError>;

    /// Handle an evaluation whose retries were exhausted. `ctx.error` holds
    /// the last failure and `ctx.new_state` the execution-error verdict.
    /// Nothing is sent.
    async fn handle_failure(&self, ctx: &mut EvalContext) -> Result<(), AlertingError>;
}

/// Writes state changes to the [`ModelStore`] and hands successful
/// evaluations to the [`NotificationService`].
#[derive(Clone)]
pub struct DefaultResultHandler {
    store: Arc<dyn ModelStore>,
    notifications: NotificationService,
}

impl DefaultResultHandler {
    pub fn new(store: Arc<dyn ModelStore>, notifications: NotificationService) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Persist the new state if it differs from the previous one. The
    /// context's rule state is advanced as soon as the store accepts the
    /// state write; a failed history append is only logged.
    async fn persist_state_change(&self, ctx: &mut EvalContext) -> Result<(), AlertingError> {
        if !ctx.state_changed() {
            return Ok(());
        }

        let at = ctx.evaluated_at();
        let mut next = ctx.rule_state;
        next.transition(ctx.new_state, at);

        let error = ctx.error.as_ref().map(ToString::to_string);
        let mut eval_matches = ctx.eval_matches.clone();
        if ctx.new_state == AlertState::Ok {
            eval_matches.extend(ctx.alert_ok_eval_matches.iter().cloned());
        }

        let cmd = SetAlertState {
            rule_id: ctx.rule.id.clone(),
            state: next.state,
            last_state_change: next.last_state_change,
            state_changes: next.state_changes,
            error: error.clone(),
            eval_data: eval_matches.clone(),
        };
        if let Err(e) = self.store.set_alert_state(&cmd).await {
            error!(rule_id = %ctx.rule.id, error = %e, "Failed to save alert state");
            return Err(e.into());
        }
        ctx.rule_state = next;

        info!(
            rule_id = %ctx.rule.id,
            prev_state = %ctx.prev_alert_state(),
            new_state = %next.state,
            state_changes = next.state_changes,
            "Alert state changed"
        );

        // History is best effort once the state itself is saved.
        let record = AlertRecord {
            rule_id: ctx.rule.id.clone(),
            state: next.state,
            prev_state: ctx.prev_alert_state(),
            eval_matches,
            error,
            created_at: at,
        };
        if let Err(e) = self.store.add_alert_record(record).await {
            error!(rule_id = %ctx.rule.id, error = %e, "Failed to add alert record");
        }
        Ok(())
    }
}

#[async_trait]
impl ResultHandler for DefaultResultHandler {
    async fn handle(&self, ctx: &mut EvalContext) -> Result<(), AlertingError> {
        self.persist_state_change(ctx).await?;
        if let Some(e) = &ctx.error {
            return Err(e.clone());
        }
        self.notifications.send_if_needed(ctx).await
    }

    async fn handle_failure(&self, ctx: &mut EvalContext) -> Result<(), AlertingError> {
        self.persist_state_change(ctx).await
    }
}

impl std::fmt::Debug for DefaultResultHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultResultHandler")
            .field("notifications", &self.notifications)
            .finish_non_exhaustive()
    }
}
