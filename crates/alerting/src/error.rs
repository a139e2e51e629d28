//! Error types for the alerting engine.

use std::time::Duration;

use crate::notification::NotifyError;
use crate::store::StoreError;

/// Error returned by a single [`Condition`](crate::conditions::Condition).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConditionError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("datasource unavailable: {0}")]
    Datasource(String),

    #[error("evaluation cancelled")]
    Cancelled,
}

/// Errors produced while scheduling, evaluating, or handling alert results.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AlertingError {
    #[error("condition {index} failed: {source}")]
    Condition {
        index: usize,
        #[source]
        source: ConditionError,
    },

    #[error("evaluation timed out after {0:?}")]
    EvalTimeout(Duration),

    #[error("result handling timed out after {0:?}")]
    ResultTimeout(Duration),

    #[error("evaluation panicked: {0}")]
    Panicked(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("invalid rule {rule_id}: {reason}")]
    InvalidRule { rule_id: String, reason: String },

    #[error("unknown condition type: {0}")]
    UnknownConditionType(String),

    #[error("unknown notifier type: {0}")]
    UnknownNotifierType(String),

    #[error("notifier {notifier_id}: {source}")]
    Notifier {
        notifier_id: String,
        #[source]
        source: NotifyError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("notification failed: {}", .0.join("; "))]
    Notification(Vec<String>),
}

impl AlertingError {
    /// Build a [`AlertingError::Panicked`] from a task join failure.
    pub(crate) fn from_join(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            AlertingError::Panicked(msg)
        } else {
            AlertingError::Cancelled
        }
    }
}
