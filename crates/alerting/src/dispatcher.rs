//! Runs queued jobs: bounded-retry evaluation, then result handling.
//!
//! Every job runs in its own task so a slow or crashing rule never holds up
//! the others. Within a job, each evaluation attempt runs in a further task
//! with its own deadline; a panic there is just another failed attempt.

use std::sync::Arc;

use chrono::Utc;
use cloudmon_core::AlertingConfig;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use crate::error::AlertingError;
use crate::eval::{EvalContext, EvalHandler};
use crate::result::ResultHandler;
use crate::rule::Rule;
use crate::scheduler::Job;

/// Releases a job's running claim when the job ends, however it ends.
struct Claim(Arc<Job>);

impl Drop for Claim {
    fn drop(&mut self) {
        self.0.release();
    }
}

pub struct JobDispatcher {
    config: AlertingConfig,
    eval_handler: Arc<dyn EvalHandler>,
    result_handler: Arc<dyn ResultHandler>,
}

impl JobDispatcher {
    pub fn new(
        config: AlertingConfig,
        eval_handler: Arc<dyn EvalHandler>,
        result_handler: Arc<dyn ResultHandler>,
    ) -> Self {
        Self {
            config,
            eval_handler,
            result_handler,
        }
    }

    /// Consume the execution queue until it closes or `cancel` fires, then
    /// wait for in-flight jobs to wind down.
    pub async fn run(self: Arc<Self>, mut queue: mpsc::Receiver<Arc<Job>>, cancel: CancellationToken) {
        let mut jobs: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                next = queue.recv() => {
                    let Some(job) = next else { break };
                    if !self.config.execute_alerts {
                        debug!(rule_id = %job.rule_id(), "alert execution disabled, dropping job");
                        job.release();
                        continue;
                    }
                    let this = Arc::clone(&self);
                    let cancel = cancel.clone();
                    jobs.spawn(async move {
                        let rule_id = job.rule_id().to_string();
                        if let Err(e) = this.process_job(job, cancel).await {
                            debug!(rule_id = %rule_id, error = %e, "job ended with error");
                        }
                    });
                }
                Some(done) = jobs.join_next(), if !jobs.is_empty() => Self::reap(done),
                _ = cancel.cancelled() => break,
            }
        }

        info!(in_flight = jobs.len(), "dispatcher stopping");
        while let Some(done) = jobs.join_next().await {
            Self::reap(done);
        }
        info!("dispatcher stopped");
    }

    fn reap(done: Result<(), tokio::task::JoinError>) {
        if let Err(e) = done {
            if e.is_panic() {
                error!(error = %AlertingError::from_join(e), "job task panicked");
            }
        }
    }

    /// Run one job to completion.
    ///
    /// If `cancel` fires mid-job, the current attempt gets the shutdown grace
    /// period to finish before it is abandoned and `Cancelled` is returned.
    /// The job's running claim is released on every exit path.
    pub async fn process_job(&self, job: Arc<Job>, cancel: CancellationToken) -> Result<(), AlertingError> {
        let _claim = Claim(Arc::clone(&job));
        // Not linked to `cancel`: an in-flight attempt keeps running through
        // the grace period. Dropping the guard cancels every attempt token.
        let job_token = CancellationToken::new();
        let _job_guard = job_token.clone().drop_guard();

        let attempts = self.run_attempts(&job, &job_token);
        tokio::pin!(attempts);

        tokio::select! {
            biased;
            result = &mut attempts => result,
            _ = cancel.cancelled() => {
                let grace = self.config.shutdown_grace();
                if tokio::time::timeout(grace, &mut attempts).await.is_err() {
                    warn!(rule_id = %job.rule_id(), ?grace, "job did not finish within shutdown grace");
                }
                Err(AlertingError::Cancelled)
            }
        }
    }

    async fn run_attempts(&self, job: &Job, job_token: &CancellationToken) -> Result<(), AlertingError> {
        let rule = job.rule();
        let max_attempts = self.config.resolved_max_attempts();
        let mut last_error = AlertingError::Cancelled;

        for attempt in 1..=max_attempts {
            let ctx = EvalContext::new(Arc::clone(&rule), job.state(), job_token.child_token());
            match self.evaluate(ctx).await {
                Ok(mut ctx) => {
                    debug!(rule_id = %rule.id, attempt, firing = ctx.firing, "evaluation succeeded");
                    return self.handle_result(job, &mut ctx).await;
                }
                Err(e) => {
                    if attempt < max_attempts {
                        warn!(rule_id = %rule.id, attempt, max_attempts, error = %e, "evaluation attempt failed, retrying");
                    }
                    last_error = e;
                }
            }
        }

        error!(rule_id = %rule.id, max_attempts, error = %last_error, "evaluation failed on every attempt");
        self.handle_exhausted(job, rule, job_token, last_error).await
    }

    /// One evaluation attempt in its own task, bounded by the evaluation
    /// timeout. Returns the context only if the evaluation produced no error.
    async fn evaluate(&self, mut ctx: EvalContext) -> Result<EvalContext, AlertingError> {
        let handler = Arc::clone(&self.eval_handler);
        let timeout = self.config.evaluation_timeout();

        let task = AbortOnDropHandle::new(tokio::spawn(async move {
            if tokio::time::timeout(timeout, handler.eval(&mut ctx)).await.is_err() {
                ctx.cancellation().cancel();
                ctx.error = Some(AlertingError::EvalTimeout(timeout));
            }
            ctx
        }));

        let mut ctx = task.await.map_err(AlertingError::from_join)?;
        match ctx.error.take() {
            Some(e) => Err(e),
            None => Ok(ctx),
        }
    }

    async fn handle_result(&self, job: &Job, ctx: &mut EvalContext) -> Result<(), AlertingError> {
        ctx.apply_new_state();
        let timeout = self.config.notification_timeout();

        let result = match tokio::time::timeout(timeout, self.result_handler.handle(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(AlertingError::ResultTimeout(timeout)),
        };
        job.commit_state(ctx.rule_state);

        if let Err(e) = &result {
            warn!(rule_id = %job.rule_id(), error = %e, "result handling failed");
        }
        result
    }

    /// Resolve the rule through its execution-error policy after the last
    /// attempt failed.
    async fn handle_exhausted(
        &self,
        job: &Job,
        rule: Arc<Rule>,
        job_token: &CancellationToken,
        last_error: AlertingError,
    ) -> Result<(), AlertingError> {
        let mut ctx = EvalContext::new(rule, job.state(), job_token.child_token());
        ctx.error = Some(last_error.clone());
        ctx.end_time = Some(Utc::now());
        ctx.apply_new_state();

        let timeout = self.config.notification_timeout();
        match tokio::time::timeout(timeout, self.result_handler.handle_failure(&mut ctx)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(rule_id = %job.rule_id(), error = %e, "failed to record evaluation failure"),
            Err(_) => warn!(rule_id = %job.rule_id(), ?timeout, "recording evaluation failure timed out"),
        }
        job.commit_state(ctx.rule_state);
        Err(last_error)
    }
}

impl std::fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
