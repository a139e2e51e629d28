//! Persistence boundary for rules, alert state, and notification records.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{AlertRecord, NotificationModel, NotificationRecord, RuleModel, SetAlertState};

pub use memory::MemoryStore;

/// Errors returned by a [`ModelStore`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// The model store the engine reads rules from and writes results to.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Every rule that should currently be scheduled.
    async fn load_rules(&self) -> Result<Vec<RuleModel>, StoreError>;

    /// Persist a rule's new alert state.
    async fn set_alert_state(&self, cmd: &SetAlertState) -> Result<(), StoreError>;

    /// Append a state-change history entry.
    async fn add_alert_record(&self, record: AlertRecord) -> Result<(), StoreError>;

    /// Notifications with the given ids plus every default notification.
    async fn get_notifications(&self, ids: &[String]) -> Result<Vec<NotificationModel>, StoreError>;

    /// Send record for a (rule, notifier) pair, created empty if missing.
    async fn get_or_create_notification_record(
        &self,
        rule_id: &str,
        notifier_id: &str,
    ) -> Result<NotificationRecord, StoreError>;

    /// Mark a send as started.
    async fn set_notification_pending(
        &self,
        rule_id: &str,
        notifier_id: &str,
        at: DateTime<Utc>,
    ) -> Result<NotificationRecord, StoreError>;

    /// Mark a send as delivered.
    async fn set_notification_completed(
        &self,
        rule_id: &str,
        notifier_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
