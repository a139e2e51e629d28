//! Resolves a rule's notifiers and sends to each one that should fire.
//!
//! Channels are independent: one notifier's failure is logged and does not
//! prevent sending to the others. In test runs the failures are collected
//! and returned instead.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::AlertingError;
use crate::eval::EvalContext;
use crate::store::ModelStore;

use super::registry::NotifierRegistry;
use super::traits::{NotificationParams, Notifier};

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn ModelStore>,
    registry: Arc<NotifierRegistry>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn ModelStore>, registry: Arc<NotifierRegistry>) -> Self {
        Self { store, registry }
    }

    /// Notifiers for the rule's explicit notification ids plus every default
    /// notification. Models that fail to build are reported as errors.
    async fn notifiers_for(
        &self,
        ctx: &EvalContext,
    ) -> Result<(Vec<Arc<dyn Notifier>>, Vec<String>), AlertingError> {
        let models = self.store.get_notifications(&ctx.rule.notifications).await?;
        let mut notifiers = Vec::with_capacity(models.len());
        let mut errors = Vec::new();
        for model in &models {
            match self.registry.build(model) {
                Ok(n) => notifiers.push(n),
                Err(e) => {
                    warn!(rule_id = %ctx.rule.id, notifier = %model.id, error = %e, "Could not build notifier");
                    errors.push(e.to_string());
                }
            }
        }
        Ok((notifiers, errors))
    }

    /// Send the evaluation result to every notifier that should fire for it.
    pub async fn send_if_needed(&self, ctx: &EvalContext) -> Result<(), AlertingError> {
        let (notifiers, mut errors) = self.notifiers_for(ctx).await?;
        if notifiers.is_empty() {
            debug!(rule_id = %ctx.rule.id, "No notifiers configured");
        }

        let params = NotificationParams::from_context(ctx);
        for notifier in &notifiers {
            if let Err(e) = self.send_one(ctx, notifier.as_ref(), &params).await {
                warn!(
                    rule_id = %ctx.rule.id,
                    notifier = notifier.notifier_id(),
                    error = %e,
                    "Notification delivery failed"
                );
                errors.push(format!("{}: {e}", notifier.notifier_id()));
            }
        }

        if ctx.is_test_run && !errors.is_empty() {
            return Err(AlertingError::Notification(errors));
        }
        Ok(())
    }

    async fn send_one(
        &self,
        ctx: &EvalContext,
        notifier: &dyn Notifier,
        params: &NotificationParams,
    ) -> Result<(), AlertingError> {
        let rule_id = ctx.rule.id.as_str();
        let notifier_id = notifier.notifier_id();
        let now = ctx.evaluated_at();

        let record = self
            .store
            .get_or_create_notification_record(rule_id, notifier_id)
            .await?;
        if !notifier.should_notify(ctx, &record) {
            debug!(rule_id, notifier = notifier_id, state = %ctx.new_state, "Skipping notification");
            return Ok(());
        }

        self.store
            .set_notification_pending(rule_id, notifier_id, now)
            .await?;
        notifier
            .notify(params)
            .await
            .map_err(|source| AlertingError::Notifier {
                notifier_id: notifier_id.to_string(),
                source,
            })?;
        self.store
            .set_notification_completed(rule_id, notifier_id, now)
            .await?;

        info!(
            rule_id,
            notifier = notifier_id,
            notifier_type = notifier.notifier_type(),
            state = %ctx.new_state,
            "Notification sent"
        );
        Ok(())
    }
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
