//! Per-attempt evaluation state and the alert-state hysteresis machine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cloudmon_core::{AlertState, EvalMatch, ExecutionErrorOption, NoDataOption};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::AlertingError;
use crate::model::elapsed;
use crate::rule::{Rule, RuleState};

/// One line of the human-readable evaluation log kept in test/debug runs.
#[derive(Debug, Clone, Serialize)]
pub struct ResultLogEntry {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Transient state of one evaluation attempt.
///
/// Created at the start of an attempt and dropped at its end. The rule is an
/// immutable snapshot; `rule_state` is this attempt's working copy of the
/// rule's live state, committed back to the job once the result is handled.
pub struct EvalContext {
    pub firing: bool,
    pub no_data_found: bool,
    pub eval_matches: Vec<EvalMatch>,
    /// Matches for series that recovered on this evaluation.
    pub alert_ok_eval_matches: Vec<EvalMatch>,
    pub error: Option<AlertingError>,
    /// Fold trace, e.g. `[true AND false] = false`.
    pub condition_evals: String,
    pub logs: Vec<ResultLogEntry>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_test_run: bool,
    pub is_debug: bool,
    pub rule: Arc<Rule>,
    pub rule_state: RuleState,
    /// Verdict after hysteresis; equals the previous state until computed.
    pub new_state: AlertState,
    prev_alert_state: AlertState,
    cancel: CancellationToken,
}

impl EvalContext {
    pub fn new(rule: Arc<Rule>, rule_state: RuleState, cancel: CancellationToken) -> Self {
        Self {
            firing: false,
            no_data_found: false,
            eval_matches: Vec::new(),
            alert_ok_eval_matches: Vec::new(),
            error: None,
            condition_evals: String::new(),
            logs: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            is_test_run: false,
            is_debug: false,
            rule,
            rule_state,
            new_state: rule_state.state,
            prev_alert_state: rule_state.state,
            cancel,
        }
    }

    /// Context for a one-off test evaluation of `rule` in its stored state.
    pub fn for_test_run(rule: Arc<Rule>, is_debug: bool) -> Self {
        let state = rule.state;
        let mut ctx = Self::new(rule, state, CancellationToken::new());
        ctx.is_test_run = true;
        ctx.is_debug = is_debug;
        ctx
    }

    /// State the rule was in when this attempt started. Fixed for the
    /// lifetime of the context.
    pub fn prev_alert_state(&self) -> AlertState {
        self.prev_alert_state
    }

    /// Token cancelled when this attempt is abandoned.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether evaluation details should be recorded in [`logs`](Self::logs).
    pub fn is_logging(&self) -> bool {
        self.is_test_run || self.is_debug
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(ResultLogEntry {
            message: message.into(),
            data: None,
        });
    }

    /// When the evaluation finished, or now if it has not.
    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or_else(Utc::now)
    }

    pub fn duration(&self) -> Duration {
        elapsed(self.start_time, self.evaluated_at())
    }

    pub fn state_changed(&self) -> bool {
        self.new_state != self.prev_alert_state
    }

    /// Raw verdict from the evaluation outcome, before hysteresis.
    fn get_new_state_internal(&self) -> AlertState {
        if self.error.is_some() {
            return match self.rule.execution_error_state {
                ExecutionErrorOption::KeepState => self.prev_alert_state,
                other => other.to_alert_state(),
            };
        }
        if self.firing {
            return AlertState::Alerting;
        }
        if self.no_data_found {
            return match self.rule.no_data_state {
                NoDataOption::KeepState => self.prev_alert_state,
                other => other.to_alert_state(),
            };
        }
        AlertState::Ok
    }

    /// Verdict after applying the rule's `for` window, evaluated at `now`.
    ///
    /// An `Alerting` verdict is held in `Pending` until the rule has been
    /// pending for longer than `for_duration`; a rule already alerting stays
    /// alerting.
    pub fn get_new_state_at(&self, now: DateTime<Utc>) -> AlertState {
        let raw = self.get_new_state_internal();
        if raw != AlertState::Alerting || self.rule.for_duration.is_zero() {
            return raw;
        }

        let since = elapsed(self.rule_state.last_state_change, now);
        match self.prev_alert_state {
            AlertState::Pending if since > self.rule.for_duration => AlertState::Alerting,
            AlertState::Alerting => AlertState::Alerting,
            _ => AlertState::Pending,
        }
    }

    pub fn get_new_state(&self) -> AlertState {
        self.get_new_state_at(self.evaluated_at())
    }

    /// Compute the verdict and store it in [`new_state`](Self::new_state).
    pub fn apply_new_state(&mut self) -> AlertState {
        self.new_state = self.get_new_state();
        self.new_state
    }
}

impl std::fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("rule_id", &self.rule.id)
            .field("firing", &self.firing)
            .field("no_data_found", &self.no_data_found)
            .field("error", &self.error)
            .field("condition_evals", &self.condition_evals)
            .field("prev_alert_state", &self.prev_alert_state)
            .field("new_state", &self.new_state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConditionError;
    use chrono::TimeZone;

    const MINUTE: Duration = Duration::from_secs(60);

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    /// Context for a rule in `prev` that last changed `since` before `now()`.
    fn ctx(prev: AlertState, for_duration: Duration, since: Duration) -> EvalContext {
        let changed = now() - chrono::Duration::from_std(since).unwrap();
        let rule = Rule::new("r1", 60).with_for(for_duration);
        EvalContext::new(
            Arc::new(rule),
            RuleState::new(prev, changed),
            CancellationToken::new(),
        )
    }

    fn condition_error() -> AlertingError {
        AlertingError::Condition {
            index: 0,
            source: ConditionError::Query("boom".into()),
        }
    }

    #[test]
    fn firing_without_for_alerts_immediately() {
        let mut c = ctx(AlertState::Ok, Duration::ZERO, MINUTE);
        c.firing = true;
        assert_eq!(c.get_new_state_at(now()), AlertState::Alerting);
    }

    #[test]
    fn firing_within_for_goes_pending() {
        let mut c = ctx(AlertState::Ok, 5 * MINUTE, 2 * MINUTE);
        c.firing = true;
        assert_eq!(c.get_new_state_at(now()), AlertState::Pending);
    }

    #[test]
    fn pending_longer_than_for_promotes() {
        let mut c = ctx(AlertState::Pending, 2 * MINUTE, 5 * MINUTE);
        c.firing = true;
        assert_eq!(c.get_new_state_at(now()), AlertState::Alerting);
    }

    #[test]
    fn pending_shorter_than_for_stays_pending() {
        let mut c = ctx(AlertState::Pending, 5 * MINUTE, 2 * MINUTE);
        c.firing = true;
        assert_eq!(c.get_new_state_at(now()), AlertState::Pending);
    }

    #[test]
    fn pending_exactly_for_stays_pending() {
        let mut c = ctx(AlertState::Pending, 2 * MINUTE, 2 * MINUTE);
        c.firing = true;
        assert_eq!(c.get_new_state_at(now()), AlertState::Pending);
    }

    #[test]
    fn alerting_stays_alerting() {
        let mut c = ctx(AlertState::Alerting, 2 * MINUTE, 5 * MINUTE);
        c.firing = true;
        assert_eq!(c.get_new_state_at(now()), AlertState::Alerting);
    }

    #[test]
    fn no_data_and_unknown_go_pending_before_alerting() {
        for prev in [AlertState::NoData, AlertState::Unknown] {
            let mut c = ctx(prev, 2 * MINUTE, 10 * MINUTE);
            c.firing = true;
            assert_eq!(c.get_new_state_at(now()), AlertState::Pending);
        }
    }

    #[test]
    fn error_with_keep_state_keeps_previous() {
        let mut c = ctx(AlertState::Ok, Duration::ZERO, MINUTE);
        Arc::get_mut(&mut c.rule).unwrap().execution_error_state = ExecutionErrorOption::KeepState;
        c.error = Some(condition_error());
        c.firing = true;
        assert_eq!(c.get_new_state_at(now()), AlertState::Ok);
    }

    #[test]
    fn error_with_alerting_policy_alerts() {
        let mut c = ctx(AlertState::Ok, Duration::ZERO, MINUTE);
        c.error = Some(condition_error());
        assert_eq!(c.get_new_state_at(now()), AlertState::Alerting);
    }

    #[test]
    fn not_firing_with_data_is_ok() {
        let c = ctx(AlertState::Ok, Duration::ZERO, MINUTE);
        assert_eq!(c.get_new_state_at(now()), AlertState::Ok);
    }

    #[test]
    fn no_data_follows_policy() {
        let mut c = ctx(AlertState::Alerting, Duration::ZERO, MINUTE);
        c.no_data_found = true;
        assert_eq!(c.get_new_state_at(now()), AlertState::NoData);

        Arc::get_mut(&mut c.rule).unwrap().no_data_state = NoDataOption::KeepState;
        assert_eq!(c.get_new_state_at(now()), AlertState::Alerting);

        Arc::get_mut(&mut c.rule).unwrap().no_data_state = NoDataOption::Ok;
        assert_eq!(c.get_new_state_at(now()), AlertState::Ok);
    }

    #[test]
    fn apply_new_state_keeps_previous_fixed() {
        let mut c = ctx(AlertState::Ok, Duration::ZERO, MINUTE);
        c.firing = true;
        c.end_time = Some(now());
        assert_eq!(c.apply_new_state(), AlertState::Alerting);
        assert_eq!(c.prev_alert_state(), AlertState::Ok);
        assert!(c.state_changed());
    }
}
