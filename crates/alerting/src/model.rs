//! Persisted models exchanged with the [`ModelStore`](crate::store::ModelStore).

use std::time::Duration;

use chrono::{DateTime, Utc};
use cloudmon_core::{AlertState, EvalMatch, ExecutionErrorOption, NoDataOption};
use serde::{Deserialize, Serialize};

/// A notification that was marked pending this recently is assumed to still
/// be in flight.
pub const PENDING_NOTIFICATION_WINDOW: Duration = Duration::from_secs(60);

// ── Rules ───────────────────────────────────────────────────────────

/// Stored definition of a monitoring rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub message: String,
    /// Evaluation interval in seconds.
    pub frequency: i64,
    /// Hysteresis window in seconds; 0 fires immediately.
    #[serde(default, rename = "for")]
    pub for_seconds: u64,
    #[serde(default)]
    pub no_data_state: NoDataOption,
    #[serde(default)]
    pub execution_error_state: ExecutionErrorOption,
    #[serde(default)]
    pub state: AlertState,
    #[serde(default)]
    pub last_state_change: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state_changes: i64,
    pub conditions: Vec<ConditionModel>,
    /// Notification ids attached to the rule.
    #[serde(default)]
    pub notifications: Vec<String>,
}

/// One condition in a rule's ordered condition list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionModel {
    #[serde(rename = "type")]
    pub condition_type: String,
    /// How this condition combines with the ones before it (`and` / `or`).
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_operator() -> String {
    "and".to_string()
}

/// Write-back of a rule's new alert state.
#[derive(Debug, Clone, Serialize)]
pub struct SetAlertState {
    pub rule_id: String,
    pub state: AlertState,
    pub last_state_change: DateTime<Utc>,
    pub state_changes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Matches attached as annotations to the state change.
    pub eval_data: Vec<EvalMatch>,
}

/// History entry written on every state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub rule_id: String,
    pub state: AlertState,
    pub prev_state: AlertState,
    pub eval_matches: Vec<EvalMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Notifications ───────────────────────────────────────────────────

/// Stored configuration of one notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationModel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub notifier_type: String,
    #[serde(default)]
    pub settings: serde_json::Value,
    /// Applies to every rule, not only rules that reference it.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub send_reminder: bool,
    /// Reminder interval in seconds.
    #[serde(default)]
    pub frequency: u64,
    #[serde(default)]
    pub disable_resolve_message: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationRecordState {
    #[default]
    Unknown,
    Pending,
    Completed,
}

/// Per-(rule, notifier) send record used for throttling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub rule_id: String,
    pub notifier_id: String,
    #[serde(default)]
    pub state: NotificationRecordState,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    pub fn new(rule_id: impl Into<String>, notifier_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            notifier_id: notifier_id.into(),
            state: NotificationRecordState::Unknown,
            updated_at: None,
            sent_at: None,
        }
    }

    /// Whether a send was started less than a minute before `now`.
    pub fn is_recently_pending(&self, now: DateTime<Utc>) -> bool {
        self.state == NotificationRecordState::Pending
            && self
                .updated_at
                .is_some_and(|at| elapsed(at, now) < PENDING_NOTIFICATION_WINDOW)
    }

    /// Throttling check for a rule that keeps alerting.
    ///
    /// `episode_started` is when the rule entered its current state; a send
    /// older than that belongs to a previous episode and does not throttle.
    /// `reminder` is the reminder interval, `None` when reminders are off.
    pub fn should_send_notification(
        &self,
        now: DateTime<Utc>,
        episode_started: DateTime<Utc>,
        reminder: Option<Duration>,
    ) -> bool {
        if self.is_recently_pending(now) {
            return false;
        }
        let sent_at = match self.sent_at {
            Some(at) if at >= episode_started => at,
            _ => return true,
        };
        match reminder {
            Some(frequency) => elapsed(sent_at, now) >= frequency,
            None => false,
        }
    }
}

/// Non-negative time between two instants.
pub(crate) fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}
