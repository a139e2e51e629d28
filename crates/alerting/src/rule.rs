//! Immutable rule snapshots and their live alert state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cloudmon_core::{AlertState, ExecutionErrorOption, NoDataOption};
use tracing::debug;

use crate::conditions::{Condition, ConditionRegistry, Operator, RuleCondition};
use crate::error::AlertingError;
use crate::model::RuleModel;

/// Alert state of a rule plus its change bookkeeping.
///
/// Lives outside [`Rule`] so the rule itself can be shared immutably while
/// state transitions are written back through the owning job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleState {
    pub state: AlertState,
    pub last_state_change: DateTime<Utc>,
    pub state_changes: i64,
}

impl RuleState {
    pub fn new(state: AlertState, last_state_change: DateTime<Utc>) -> Self {
        Self {
            state,
            last_state_change,
            state_changes: 0,
        }
    }

    /// Move to `new_state` at `at`. Returns `false` (and changes nothing)
    /// when the state is unchanged.
    pub fn transition(&mut self, new_state: AlertState, at: DateTime<Utc>) -> bool {
        if self.state == new_state {
            return false;
        }
        self.state = new_state;
        self.last_state_change = at;
        self.state_changes += 1;
        true
    }

    /// Whichever of the two states changed last.
    pub fn newest(self, other: RuleState) -> RuleState {
        if other.last_state_change > self.last_state_change
            || (other.last_state_change == self.last_state_change
                && other.state_changes > self.state_changes)
        {
            other
        } else {
            self
        }
    }
}

impl Default for RuleState {
    fn default() -> Self {
        Self::new(AlertState::Unknown, DateTime::<Utc>::default())
    }
}

/// Snapshot of one monitoring rule for the duration of a scheduling cycle.
#[derive(Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub message: String,
    /// Evaluation interval in seconds.
    pub frequency: i64,
    /// Time a breach must persist in `Pending` before it alerts.
    pub for_duration: Duration,
    pub no_data_state: NoDataOption,
    pub execution_error_state: ExecutionErrorOption,
    pub conditions: Vec<RuleCondition>,
    pub notifications: Vec<String>,
    /// State as it was when the snapshot was read.
    pub state: RuleState,
}

impl Rule {
    pub fn new(id: impl Into<String>, frequency: i64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            message: String::new(),
            frequency,
            for_duration: Duration::ZERO,
            no_data_state: NoDataOption::default(),
            execution_error_state: ExecutionErrorOption::default(),
            conditions: Vec::new(),
            notifications: Vec::new(),
            state: RuleState::default(),
        }
    }

    /// Append a condition combined with AND.
    pub fn with_condition(self, condition: Arc<dyn Condition>) -> Self {
        self.with_condition_op(Operator::And, condition)
    }

    pub fn with_condition_op(mut self, operator: Operator, condition: Arc<dyn Condition>) -> Self {
        self.conditions.push(RuleCondition::new(operator, condition));
        self
    }

    pub fn with_for(mut self, for_duration: Duration) -> Self {
        self.for_duration = for_duration;
        self
    }

    pub fn with_state(mut self, state: RuleState) -> Self {
        self.state = state;
        self
    }

    pub fn with_notifications(mut self, ids: Vec<String>) -> Self {
        self.notifications = ids;
        self
    }

    /// Build a rule from its stored model, resolving conditions through the
    /// registry.
    pub fn from_model(model: &RuleModel, registry: &ConditionRegistry) -> Result<Self, AlertingError> {
        let invalid = |reason: &str| AlertingError::InvalidRule {
            rule_id: model.id.clone(),
            reason: reason.to_string(),
        };

        if model.frequency <= 0 {
            return Err(invalid("frequency must be positive"));
        }
        if model.conditions.is_empty() {
            return Err(invalid("rule has no conditions"));
        }

        let conditions = model
            .conditions
            .iter()
            .enumerate()
            .map(|(index, c)| {
                let condition = registry.build(c, index)?;
                Ok(RuleCondition::new(Operator::parse(&c.operator), condition))
            })
            .collect::<Result<Vec<_>, AlertingError>>()?;

        debug!(rule_id = %model.id, conditions = conditions.len(), "built rule from model");

        Ok(Self {
            id: model.id.clone(),
            name: model.name.clone(),
            message: model.message.clone(),
            frequency: model.frequency,
            for_duration: Duration::from_secs(model.for_seconds),
            no_data_state: model.no_data_state,
            execution_error_state: model.execution_error_state,
            conditions,
            notifications: model.notifications.clone(),
            state: RuleState {
                state: model.state,
                last_state_change: model.last_state_change.unwrap_or_default(),
                state_changes: model.state_changes,
            },
        })
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("frequency", &self.frequency)
            .field("for_duration", &self.for_duration)
            .field("no_data_state", &self.no_data_state)
            .field("execution_error_state", &self.execution_error_state)
            .field("conditions", &self.conditions.len())
            .field("notifications", &self.notifications)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConditionModel;
    use crate::testutil::StaticCondition;
    use chrono::TimeZone;

    fn registry() -> ConditionRegistry {
        let mut r = ConditionRegistry::new();
        r.register("static", |_, _| {
            Ok(Arc::new(StaticCondition::firing(true)) as Arc<dyn Condition>)
        });
        r
    }

    fn model(conditions: Vec<&str>, frequency: i64) -> RuleModel {
        RuleModel {
            id: "r1".to_string(),
            name: "Rule 1".to_string(),
            message: String::new(),
            frequency,
            for_seconds: 120,
            no_data_state: NoDataOption::KeepState,
            execution_error_state: ExecutionErrorOption::Alerting,
            state: AlertState::Ok,
            last_state_change: None,
            state_changes: 4,
            conditions: conditions
                .into_iter()
                .map(|t| ConditionModel {
                    condition_type: t.to_string(),
                    operator: "and".to_string(),
                    params: serde_json::Value::Null,
                })
                .collect(),
            notifications: vec!["n1".to_string()],
        }
    }

    #[test]
    fn from_model_copies_policy_and_state() {
        let rule = Rule::from_model(&model(vec!["static", "static"], 60), &registry()).unwrap();
        assert_eq!(rule.conditions.len(), 2);
        assert_eq!(rule.for_duration, Duration::from_secs(120));
        assert_eq!(rule.no_data_state, NoDataOption::KeepState);
        assert_eq!(rule.state.state, AlertState::Ok);
        assert_eq!(rule.state.state_changes, 4);
    }

    #[test]
    fn from_model_keeps_stored_operators() {
        let mut m = model(vec!["static", "static", "static"], 60);
        m.conditions[1].operator = "OR".to_string();
        m.conditions[2].operator = "xor".to_string();
        let rule = Rule::from_model(&m, &registry()).unwrap();
        let ops: Vec<Operator> = rule.conditions.iter().map(|c| c.operator).collect();
        assert_eq!(ops, vec![Operator::And, Operator::Or, Operator::And]);
    }

    #[test]
    fn from_model_rejects_bad_rules() {
        let reg = registry();
        assert!(matches!(
            Rule::from_model(&model(vec![], 60), &reg),
            Err(AlertingError::InvalidRule { .. })
        ));
        assert!(matches!(
            Rule::from_model(&model(vec!["static"], 0), &reg),
            Err(AlertingError::InvalidRule { .. })
        ));
        assert!(matches!(
            Rule::from_model(&model(vec!["query"], 60), &reg),
            Err(AlertingError::UnknownConditionType(_))
        ));
    }

    #[test]
    fn transition_counts_only_real_changes() {
        let t0 = Utc.timestamp_opt(1_000, 0).unwrap();
        let t1 = Utc.timestamp_opt(2_000, 0).unwrap();
        let mut s = RuleState::new(AlertState::Ok, t0);
        assert!(!s.transition(AlertState::Ok, t1));
        assert_eq!(s.last_state_change, t0);
        assert!(s.transition(AlertState::Alerting, t1));
        assert_eq!(s.state_changes, 1);
        assert_eq!(s.last_state_change, t1);
    }

    #[test]
    fn newest_prefers_later_change() {
        let old = RuleState::new(AlertState::Ok, Utc.timestamp_opt(1_000, 0).unwrap());
        let new = RuleState::new(AlertState::Paused, Utc.timestamp_opt(2_000, 0).unwrap());
        assert_eq!(old.newest(new).state, AlertState::Paused);
        assert_eq!(new.newest(old).state, AlertState::Paused);
    }
}
