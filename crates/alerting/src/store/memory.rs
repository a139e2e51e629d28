//! In-memory [`ModelStore`] for embedding and tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudmon_core::AlertState;

use crate::model::{
    AlertRecord, NotificationModel, NotificationRecord, NotificationRecordState, RuleModel,
    SetAlertState,
};

use super::{ModelStore, StoreError};

#[derive(Default)]
struct Inner {
    rules: HashMap<String, RuleModel>,
    notifications: HashMap<String, NotificationModel>,
    records: HashMap<(String, String), NotificationRecord>,
    history: Vec<AlertRecord>,
}

/// Keeps every model in process memory behind a `std::sync::RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a rule.
    pub fn upsert_rule(&self, rule: RuleModel) {
        self.write().rules.insert(rule.id.clone(), rule);
    }

    pub fn remove_rule(&self, rule_id: &str) -> bool {
        self.write().rules.remove(rule_id).is_some()
    }

    pub fn rule(&self, rule_id: &str) -> Option<RuleModel> {
        self.read().rules.get(rule_id).cloned()
    }

    /// Insert or replace a notification channel.
    pub fn upsert_notification(&self, notification: NotificationModel) {
        self.write()
            .notifications
            .insert(notification.id.clone(), notification);
    }

    pub fn notification_record(&self, rule_id: &str, notifier_id: &str) -> Option<NotificationRecord> {
        self.read()
            .records
            .get(&(rule_id.to_string(), notifier_id.to_string()))
            .cloned()
    }

    /// History entries for one rule, oldest first.
    pub fn alert_records(&self, rule_id: &str) -> Vec<AlertRecord> {
        self.read()
            .history
            .iter()
            .filter(|r| r.rule_id == rule_id)
            .cloned()
            .collect()
    }

    /// Matches of the most recent `Alerting` record for a rule, used to
    /// carry context into the resolving record.
    fn last_alerting_matches(inner: &Inner, rule_id: &str) -> Vec<cloudmon_core::EvalMatch> {
        inner
            .history
            .iter()
            .rev()
            .find(|r| r.rule_id == rule_id)
            .filter(|r| r.state == AlertState::Alerting)
            .map(|r| r.eval_matches.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn load_rules(&self) -> Result<Vec<RuleModel>, StoreError> {
        let mut rules: Vec<RuleModel> = self.read().rules.values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rules)
    }

    async fn set_alert_state(&self, cmd: &SetAlertState) -> Result<(), StoreError> {
        let mut inner = self.write();
        let rule = inner
            .rules
            .get_mut(&cmd.rule_id)
            .ok_or_else(|| StoreError::RuleNotFound(cmd.rule_id.clone()))?;
        rule.state = cmd.state;
        rule.last_state_change = Some(cmd.last_state_change);
        rule.state_changes = cmd.state_changes;
        Ok(())
    }

    async fn add_alert_record(&self, mut record: AlertRecord) -> Result<(), StoreError> {
        let mut inner = self.write();
        if record.state == AlertState::Ok && record.prev_state == AlertState::Alerting {
            // A resolve keeps the matches that were alerting, unless the
            // evaluation already reported them.
            for m in Self::last_alerting_matches(&inner, &record.rule_id) {
                if !record.eval_matches.iter().any(|e| e.metric == m.metric && e.tags == m.tags) {
                    record.eval_matches.push(m);
                }
            }
        }
        inner.history.push(record);
        Ok(())
    }

    async fn get_notifications(&self, ids: &[String]) -> Result<Vec<NotificationModel>, StoreError> {
        let inner = self.read();
        let mut found: Vec<NotificationModel> = inner
            .notifications
            .values()
            .filter(|n| n.is_default || ids.contains(&n.id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn get_or_create_notification_record(
        &self,
        rule_id: &str,
        notifier_id: &str,
    ) -> Result<NotificationRecord, StoreError> {
        let mut inner = self.write();
        let record = inner
            .records
            .entry((rule_id.to_string(), notifier_id.to_string()))
            .or_insert_with(|| NotificationRecord::new(rule_id, notifier_id));
        Ok(record.clone())
    }

    async fn set_notification_pending(
        &self,
        rule_id: &str,
        notifier_id: &str,
        at: DateTime<Utc>,
    ) -> Result<NotificationRecord, StoreError> {
        let mut inner = self.write();
        let record = inner
            .records
            .entry((rule_id.to_string(), notifier_id.to_string()))
            .or_insert_with(|| NotificationRecord::new(rule_id, notifier_id));
        record.state = NotificationRecordState::Pending;
        record.updated_at = Some(at);
        Ok(record.clone())
    }

    async fn set_notification_completed(
        &self,
        rule_id: &str,
        notifier_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        let record = inner
            .records
            .entry((rule_id.to_string(), notifier_id.to_string()))
            .or_insert_with(|| NotificationRecord::new(rule_id, notifier_id));
        record.state = NotificationRecordState::Completed;
        record.updated_at = Some(at);
        record.sent_at = Some(at);
        Ok(())
    }
}
