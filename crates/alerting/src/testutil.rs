//! Hand-written test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cloudmon_core::EvalMatch;

use crate::conditions::{Condition, ConditionResult};
use crate::error::{AlertingError, ConditionError};
use crate::eval::{EvalContext, EvalHandler};
use crate::model::NotificationModel;
use crate::notification::{NotificationParams, Notifier, NotifierSettings, NotifyError};
use crate::result::ResultHandler;

/// Fixed instant `secs` after a base time.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Condition returning a canned result.
#[derive(Debug, Clone, Default)]
pub struct StaticCondition {
    result: ConditionResult,
    error: Option<ConditionError>,
    delay: Option<Duration>,
}

impl StaticCondition {
    pub fn firing(firing: bool) -> Self {
        Self {
            result: ConditionResult {
                firing,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn no_data() -> Self {
        Self {
            result: ConditionResult {
                no_data_found: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn failing(error: ConditionError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_match(mut self, metric: &str, value: f64) -> Self {
        self.result.eval_matches.push(EvalMatch::new(metric, Some(value)));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Condition for StaticCondition {
    async fn eval(&self, _ctx: &EvalContext) -> Result<ConditionResult, ConditionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.result.clone()),
        }
    }
}

/// Eval handler that fails or panics a set number of times, then fires.
#[derive(Debug, Default)]
pub struct ScriptedEvalHandler {
    fail_first: usize,
    panic_first: usize,
    attempts: AtomicUsize,
}

impl ScriptedEvalHandler {
    pub fn failing_times(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Default::default()
        }
    }

    pub fn panicking_times(n: usize) -> Self {
        Self {
            panic_first: n,
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvalHandler for ScriptedEvalHandler {
    async fn eval(&self, ctx: &mut EvalContext) {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.panic_first {
            panic!("scripted panic on attempt {attempt}");
        }
        if attempt < self.fail_first {
            ctx.error = Some(AlertingError::Condition {
                index: 0,
                source: ConditionError::Query(format!("attempt {attempt}")),
            });
        } else {
            ctx.firing = true;
        }
        ctx.end_time = Some(Utc::now());
    }
}

/// Result handler that applies the state transition and counts calls.
#[derive(Debug, Default)]
pub struct CountingResultHandler {
    handled: AtomicUsize,
    failures: AtomicUsize,
}

impl CountingResultHandler {
    pub fn handled(&self) -> usize {
        self.handled.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultHandler for CountingResultHandler {
    async fn handle(&self, ctx: &mut EvalContext) -> Result<(), AlertingError> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        let at = ctx.evaluated_at();
        ctx.rule_state.transition(ctx.new_state, at);
        Ok(())
    }

    async fn handle_failure(&self, ctx: &mut EvalContext) -> Result<(), AlertingError> {
        self.failures.fetch_add(1, Ordering::SeqCst);
        let at = ctx.evaluated_at();
        ctx.rule_state.transition(ctx.new_state, at);
        Ok(())
    }
}

/// Notifier counting every delivery attempt, optionally failing them all.
#[derive(Debug)]
pub struct RecordingNotifier {
    id: String,
    settings: NotifierSettings,
    sent: Arc<AtomicUsize>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn from_model(model: &NotificationModel, sent: Arc<AtomicUsize>, fail: bool) -> Self {
        Self {
            id: model.id.clone(),
            settings: NotifierSettings::from_model(model),
            sent,
            fail,
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn notifier_type(&self) -> &str {
        "recording"
    }

    fn notifier_id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> NotifierSettings {
        self.settings
    }

    async fn notify(&self, _params: &NotificationParams) -> Result<(), NotifyError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(NotifyError::Delivery("mock failure".to_string()))
        } else {
            Ok(())
        }
    }
}
