//! Explicit registry mapping condition types to factories.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AlertingError;
use crate::model::ConditionModel;

use super::Condition;

/// Builds a condition from its stored model and its index in the rule.
pub type ConditionFactory =
    Arc<dyn Fn(&ConditionModel, usize) -> Result<Arc<dyn Condition>, AlertingError> + Send + Sync>;

/// Condition factories keyed by condition type.
///
/// Built once at startup and handed to whatever turns rule models into
/// [`Rule`](crate::rule::Rule)s.
#[derive(Clone, Default)]
pub struct ConditionRegistry {
    factories: HashMap<String, ConditionFactory>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for the same type.
    pub fn register<F>(&mut self, condition_type: impl Into<String>, factory: F)
    where
        F: Fn(&ConditionModel, usize) -> Result<Arc<dyn Condition>, AlertingError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(condition_type.into(), Arc::new(factory));
    }

    pub fn contains(&self, condition_type: &str) -> bool {
        self.factories.contains_key(condition_type)
    }

    /// Build the condition at `index` of a rule.
    pub fn build(
        &self,
        model: &ConditionModel,
        index: usize,
    ) -> Result<Arc<dyn Condition>, AlertingError> {
        let factory = self
            .factories
            .get(&model.condition_type)
            .ok_or_else(|| AlertingError::UnknownConditionType(model.condition_type.clone()))?;
        factory(model, index)
    }
}

impl std::fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("ConditionRegistry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StaticCondition;

    fn model(t: &str) -> ConditionModel {
        ConditionModel {
            condition_type: t.to_string(),
            operator: "and".to_string(),
            params: serde_json::json!({ "firing": true }),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let registry = ConditionRegistry::new();
        let err = registry.build(&model("query"), 0).err().unwrap();
        assert!(matches!(err, AlertingError::UnknownConditionType(t) if t == "query"));
    }

    #[test]
    fn registered_factory_receives_model() {
        let mut registry = ConditionRegistry::new();
        registry.register("static", |m, _| {
            let firing = m.params["firing"].as_bool().unwrap_or(false);
            Ok(Arc::new(StaticCondition::firing(firing)) as Arc<dyn Condition>)
        });
        assert!(registry.contains("static"));
        assert!(registry.build(&model("static"), 0).is_ok());
    }
}
