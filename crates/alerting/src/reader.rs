//! Periodic source of rule snapshots for the scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::conditions::ConditionRegistry;
use crate::error::AlertingError;
use crate::rule::Rule;
use crate::store::ModelStore;

/// Produces the full current rule set.
#[async_trait]
pub trait RuleReader: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Arc<Rule>>, AlertingError>;
}

/// Loads rule models from a [`ModelStore`] and builds them through a
/// [`ConditionRegistry`]. Rules that fail to build are logged and skipped.
pub struct StoreRuleReader {
    store: Arc<dyn ModelStore>,
    registry: Arc<ConditionRegistry>,
}

impl StoreRuleReader {
    pub fn new(store: Arc<dyn ModelStore>, registry: Arc<ConditionRegistry>) -> Self {
        Self { store, registry }
    }
}

#[async_trait]
impl RuleReader for StoreRuleReader {
    async fn fetch(&self) -> Result<Vec<Arc<Rule>>, AlertingError> {
        let models = self.store.load_rules().await?;
        let total = models.len();

        let rules: Vec<Arc<Rule>> = models
            .iter()
            .filter_map(|model| match Rule::from_model(model, &self.registry) {
                Ok(rule) => Some(Arc::new(rule)),
                Err(e) => {
                    warn!(rule_id = %model.id, error = %e, "Skipping invalid rule");
                    None
                }
            })
            .collect();

        debug!(loaded = rules.len(), skipped = total - rules.len(), "rules fetched");
        Ok(rules)
    }
}
