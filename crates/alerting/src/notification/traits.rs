//! Notifier trait definition and shared types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use cloudmon_core::{AlertState, EvalMatch};
use serde::Serialize;

use crate::eval::EvalContext;
use crate::model::{NotificationModel, NotificationRecord};

use super::policy::{self, Transition};

/// Errors that can occur during notification delivery.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Throttling knobs of one notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifierSettings {
    pub send_reminder: bool,
    /// Reminder interval.
    pub frequency: Duration,
    pub disable_resolve_message: bool,
}

impl NotifierSettings {
    pub fn from_model(model: &NotificationModel) -> Self {
        Self {
            send_reminder: model.send_reminder,
            frequency: Duration::from_secs(model.frequency),
            disable_resolve_message: model.disable_resolve_message,
        }
    }

    /// Reminder interval, `None` when reminders are off.
    pub fn reminder(&self) -> Option<Duration> {
        self.send_reminder.then_some(self.frequency)
    }
}

/// Payload handed to a notifier.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationParams {
    pub rule_id: String,
    pub rule_name: String,
    /// `[STATE] rule name`.
    pub title: String,
    pub message: String,
    pub state: AlertState,
    pub prev_state: AlertState,
    pub eval_matches: Vec<EvalMatch>,
    pub recovered_matches: Vec<EvalMatch>,
    pub condition_evals: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
}

impl NotificationParams {
    pub fn from_context(ctx: &EvalContext) -> Self {
        let state = ctx.new_state;
        Self {
            rule_id: ctx.rule.id.clone(),
            rule_name: ctx.rule.name.clone(),
            title: format!("[{}] {}", state.as_str().to_uppercase(), ctx.rule.name),
            message: ctx.rule.message.clone(),
            state,
            prev_state: ctx.prev_alert_state(),
            eval_matches: ctx.eval_matches.clone(),
            recovered_matches: ctx.alert_ok_eval_matches.clone(),
            condition_evals: ctx.condition_evals.clone(),
            error: ctx.error.as_ref().map(|e| e.to_string()),
            start_time: ctx.start_time,
        }
    }
}

/// One pluggable notification channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Channel type, e.g. `"webhook"`.
    fn notifier_type(&self) -> &str;

    /// Id of the notification model this notifier was built from.
    fn notifier_id(&self) -> &str;

    fn settings(&self) -> NotifierSettings;

    /// Deliver one notification.
    async fn notify(&self, params: &NotificationParams) -> Result<(), NotifyError>;

    /// Whether this evaluation warrants a notification on this channel.
    fn should_notify(&self, ctx: &EvalContext, record: &NotificationRecord) -> bool {
        let transition = Transition::classify(
            ctx.prev_alert_state(),
            ctx.new_state,
            !ctx.alert_ok_eval_matches.is_empty(),
        );
        policy::should_notify(
            transition,
            &self.settings(),
            record,
            ctx.evaluated_at(),
            ctx.rule_state.last_state_change,
        )
    }
}
