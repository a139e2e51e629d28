//! Explicit registry mapping notifier types to factories.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AlertingError;
use crate::model::NotificationModel;

use super::traits::{NotificationParams, Notifier, NotifierSettings, NotifyError};

/// Builds a notifier from its stored model.
pub type NotifierFactory =
    Arc<dyn Fn(&NotificationModel) -> Result<Arc<dyn Notifier>, NotifyError> + Send + Sync>;

/// Notifier factories keyed by notifier type.
#[derive(Clone, Default)]
pub struct NotifierRegistry {
    factories: HashMap<String, NotifierFactory>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `log` notifier.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(LogNotifier::TYPE, |model| {
            Ok(Arc::new(LogNotifier::from_model(model)) as Arc<dyn Notifier>)
        });
        registry
    }

    /// Register a factory, replacing any previous one for the same type.
    pub fn register<F>(&mut self, notifier_type: impl Into<String>, factory: F)
    where
        F: Fn(&NotificationModel) -> Result<Arc<dyn Notifier>, NotifyError> + Send + Sync + 'static,
    {
        self.factories.insert(notifier_type.into(), Arc::new(factory));
    }

    pub fn contains(&self, notifier_type: &str) -> bool {
        self.factories.contains_key(notifier_type)
    }

    pub fn build(&self, model: &NotificationModel) -> Result<Arc<dyn Notifier>, AlertingError> {
        let factory = self
            .factories
            .get(&model.notifier_type)
            .ok_or_else(|| AlertingError::UnknownNotifierType(model.notifier_type.clone()))?;
        factory(model).map_err(|source| AlertingError::Notifier {
            notifier_id: model.id.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for NotifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("NotifierRegistry").field("types", &types).finish()
    }
}

/// Writes notifications to the `tracing` log.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    id: String,
    settings: NotifierSettings,
}

impl LogNotifier {
    pub const TYPE: &'static str = "log";

    pub fn from_model(model: &NotificationModel) -> Self {
        Self {
            id: model.id.clone(),
            settings: NotifierSettings::from_model(model),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn notifier_type(&self) -> &str {
        Self::TYPE
    }

    fn notifier_id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> NotifierSettings {
        self.settings
    }

    async fn notify(&self, params: &NotificationParams) -> Result<(), NotifyError> {
        tracing::info!(
            notifier = %self.id,
            rule_id = %params.rule_id,
            state = %params.state,
            prev_state = %params.prev_state,
            matches = params.eval_matches.len(),
            "{}",
            params.title
        );
        Ok(())
    }
}
