//! Top-level engine wiring the ticker, scheduler and dispatcher together.
//!
//! ```text
//! Ticker ─tick─▶ Scheduler.tick ─Arc<Job>─▶ exec queue ─▶ JobDispatcher
//!                     ▲                                        │
//!               RuleReader (every Nth tick)        EvalHandler → ResultHandler
//! ```

use std::sync::Arc;

use chrono::Utc;
use cloudmon_core::AlertingConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::conditions::ConditionRegistry;
use crate::dispatcher::JobDispatcher;
use crate::error::AlertingError;
use crate::eval::{DefaultEvalHandler, EvalHandler, RuleTester};
use crate::notification::{NotificationService, NotifierRegistry};
use crate::reader::{RuleReader, StoreRuleReader};
use crate::result::{DefaultResultHandler, ResultHandler};
use crate::scheduler::{Job, Scheduler};
use crate::store::ModelStore;
use crate::ticker::Ticker;

pub struct AlertEngine {
    config: AlertingConfig,
    reader: Arc<dyn RuleReader>,
    eval_handler: Arc<dyn EvalHandler>,
    dispatcher: Arc<JobDispatcher>,
}

impl AlertEngine {
    pub fn new(
        config: AlertingConfig,
        reader: Arc<dyn RuleReader>,
        eval_handler: Arc<dyn EvalHandler>,
        result_handler: Arc<dyn ResultHandler>,
    ) -> Self {
        let dispatcher = Arc::new(JobDispatcher::new(
            config.clone(),
            Arc::clone(&eval_handler),
            result_handler,
        ));
        Self {
            config,
            reader,
            eval_handler,
            dispatcher,
        }
    }

    /// Engine backed by a model store with the default evaluation and
    /// result handling.
    pub fn with_store(
        config: AlertingConfig,
        store: Arc<dyn ModelStore>,
        conditions: Arc<ConditionRegistry>,
        notifiers: Arc<NotifierRegistry>,
    ) -> Self {
        let reader = Arc::new(StoreRuleReader::new(Arc::clone(&store), conditions));
        let notifications = NotificationService::new(Arc::clone(&store), notifiers);
        let result_handler = Arc::new(DefaultResultHandler::new(store, notifications));
        Self::new(config, reader, Arc::new(DefaultEvalHandler), result_handler)
    }

    pub fn config(&self) -> &AlertingConfig {
        &self.config
    }

    /// Tester sharing this engine's evaluation handler and timeout.
    pub fn rule_tester(&self) -> RuleTester {
        RuleTester::new(
            Arc::clone(&self.eval_handler),
            self.config.evaluation_timeout(),
        )
    }

    /// Run until `cancel` fires. Returns immediately when alerting is
    /// disabled.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), AlertingError> {
        if !self.config.enabled {
            info!("alerting disabled, engine not started");
            return Ok(());
        }

        info!(
            min_interval_seconds = self.config.min_interval_seconds,
            max_attempts = self.config.resolved_max_attempts(),
            execute_alerts = self.config.execute_alerts,
            "alert engine starting"
        );

        let engine_token = cancel.child_token();
        let (exec_tx, exec_rx) = mpsc::channel(self.config.resolved_exec_queue_capacity());

        let dispatcher = tokio::spawn(
            Arc::clone(&self.dispatcher).run(exec_rx, engine_token.clone()),
        );

        let ticker = Ticker::spawn(
            Utc::now(),
            chrono::Duration::seconds(self.config.ticker_offset_seconds),
            engine_token.clone(),
        );
        let tick_loop = tokio::spawn(tick_loop(
            ticker,
            Scheduler::new(self.config.min_interval_seconds),
            Arc::clone(&self.reader),
            self.config.resolved_rule_refresh_ticks(),
            exec_tx,
            engine_token.clone(),
        ));

        let tick_result = tick_loop.await.map_err(AlertingError::from_join);
        engine_token.cancel();

        if let Err(e) = dispatcher.await {
            error!(error = %AlertingError::from_join(e), "dispatcher task failed");
        }

        match tick_result {
            Ok(()) => {
                info!("alert engine stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "tick loop failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Feed every tick to the scheduler, refreshing rules every
/// `refresh_ticks` ticks starting with the first one.
async fn tick_loop(
    mut ticker: Ticker,
    mut scheduler: Scheduler,
    reader: Arc<dyn RuleReader>,
    refresh_ticks: u64,
    exec_queue: mpsc::Sender<Arc<Job>>,
    cancel: CancellationToken,
) {
    let mut tick_index: u64 = 0;

    loop {
        let tick = tokio::select! {
            tick = ticker.tick() => match tick {
                Some(tick) => tick,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        if tick_index % refresh_ticks == 0 {
            match reader.fetch().await {
                Ok(rules) => scheduler.update(rules),
                Err(e) => error!(error = %e, "failed to read alert rules"),
            }
        }
        tick_index = tick_index.wrapping_add(1);

        scheduler.tick(tick.timestamp(), &exec_queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::Condition;
    use crate::model::RuleModel;
    use crate::notification::Notifier;
    use crate::store::MemoryStore;
    use crate::testutil::{RecordingNotifier, StaticCondition};
    use cloudmon_core::AlertState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Setup {
        store: Arc<MemoryStore>,
        engine: Arc<AlertEngine>,
        sent: Arc<AtomicUsize>,
    }

    fn setup(config: AlertingConfig) -> Setup {
        let store = Arc::new(MemoryStore::new());
        let rule: RuleModel = serde_json::from_value(serde_json::json!({
            "id": "cpu-high",
            "name": "CPU high",
            "frequency": 10,
            "conditions": [{"type": "static"}],
            "notifications": ["ops"]
        }))
        .unwrap();
        store.upsert_rule(rule);
        store.upsert_notification(
            serde_json::from_value(serde_json::json!({"id": "ops", "name": "ops", "type": "recording"}))
                .unwrap(),
        );

        let mut conditions = ConditionRegistry::new();
        conditions.register("static", |_, _| {
            Ok(Arc::new(StaticCondition::firing(true)) as Arc<dyn Condition>)
        });

        let sent = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sent);
        let mut notifiers = NotifierRegistry::new();
        notifiers.register("recording", move |m| {
            Ok(Arc::new(RecordingNotifier::from_model(m, counter.clone(), false)) as Arc<dyn Notifier>)
        });

        let engine = Arc::new(AlertEngine::with_store(
            config,
            store.clone(),
            Arc::new(conditions),
            Arc::new(notifiers),
        ));
        Setup { store, engine, sent }
    }

    async fn run_for(engine: &Arc<AlertEngine>, secs: u64) -> Result<(), AlertingError> {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let engine = Arc::clone(engine);
            let cancel = cancel.clone();
            async move { engine.run(cancel).await }
        });
        tokio::time::sleep(Duration::from_secs(secs)).await;
        cancel.cancel();
        handle.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn firing_rule_alerts_and_notifies_once() {
        let s = setup(AlertingConfig::default());
        run_for(&s.engine, 45).await.unwrap();

        let rule = s.store.rule("cpu-high").unwrap();
        assert_eq!(rule.state, AlertState::Alerting);
        assert_eq!(rule.state_changes, 1);
        assert_eq!(s.store.alert_records("cpu-high").len(), 1);
        assert_eq!(s.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_engine_returns_immediately() {
        let s = setup(AlertingConfig {
            enabled: false,
            ..AlertingConfig::default()
        });
        s.engine.run(CancellationToken::new()).await.unwrap();
        assert_eq!(s.store.rule("cpu-high").unwrap().state, AlertState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_alerts_off_schedules_without_evaluating() {
        let s = setup(AlertingConfig {
            execute_alerts: false,
            ..AlertingConfig::default()
        });
        run_for(&s.engine, 45).await.unwrap();

        assert_eq!(s.store.rule("cpu-high").unwrap().state, AlertState::Unknown);
        assert_eq!(s.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rule_tester_uses_engine_handler() {
        let s = setup(AlertingConfig::default());
        let rule = crate::rule::Rule::new("r1", 60)
            .with_condition(Arc::new(StaticCondition::firing(true)));
        let ctx = s.engine.rule_tester().test_rule(Arc::new(rule), false).await;
        assert_eq!(ctx.new_state, AlertState::Alerting);
        assert_eq!(s.sent.load(Ordering::SeqCst), 0);
    }
}
