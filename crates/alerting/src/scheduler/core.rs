//! Decides which jobs are due on each tick.

use std::collections::HashMap;
use std::sync::Arc;

use cloudmon_core::AlertState;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::rule::Rule;

use super::job::Job;

/// Holds the live job set and enqueues due jobs.
///
/// `update` and `tick` are called from the engine's single tick loop, so the
/// job map itself needs no locking.
pub struct Scheduler {
    jobs: HashMap<String, Arc<Job>>,
    min_interval_seconds: i64,
}

impl Scheduler {
    pub fn new(min_interval_seconds: i64) -> Self {
        Self {
            jobs: HashMap::new(),
            min_interval_seconds,
        }
    }

    /// Rebuild the job set from a refreshed rule list.
    ///
    /// Existing jobs are reused by rule id so their offset and running flag
    /// survive the refresh; jobs whose rule disappeared are dropped. A job
    /// that is mid-evaluation when dropped runs to completion on its own.
    ///
    /// Offsets stay at 1: evaluations are not spread across the frequency
    /// window, a due rule is dispatched on the tick after it becomes due.
    pub fn update(&mut self, rules: Vec<Arc<Rule>>) {
        let mut jobs = HashMap::with_capacity(rules.len());

        for rule in rules {
            let job = match self.jobs.remove(&rule.id) {
                Some(job) => {
                    job.set_rule(Arc::clone(&rule));
                    job
                }
                None => Arc::new(Job::new(Arc::clone(&rule))),
            };

            // A zero offset would make the offset check divide by zero.
            if job.offset() == 0 {
                job.set_offset(1);
            }

            jobs.insert(rule.id.clone(), job);
        }

        if !self.jobs.is_empty() {
            debug!(dropped = self.jobs.len(), "dropping jobs for removed rules");
        }
        info!(jobs = jobs.len(), "scheduler updated");
        self.jobs = jobs;
    }

    /// Enqueue every job that is due at `now` (unix seconds).
    ///
    /// Returns how many jobs were enqueued.
    pub fn tick(&mut self, now: i64, exec_queue: &mpsc::Sender<Arc<Job>>) -> usize {
        let mut enqueued = 0;

        for job in self.jobs.values() {
            if job.is_running() || job.state().state == AlertState::Paused {
                continue;
            }

            if job.offset_wait() && now.rem_euclid(job.offset().max(1)) == 0 {
                job.set_offset_wait(false);
                if Self::enqueue(job, exec_queue) {
                    enqueued += 1;
                }
                continue;
            }

            let interval = job.rule().frequency.max(self.min_interval_seconds).max(1);
            if now.rem_euclid(interval) == 0 {
                if job.offset() > 0 {
                    job.set_offset_wait(true);
                } else if Self::enqueue(job, exec_queue) {
                    enqueued += 1;
                }
            }
        }

        enqueued
    }

    /// Claim the job and try to queue it without blocking.
    fn enqueue(job: &Arc<Job>, exec_queue: &mpsc::Sender<Arc<Job>>) -> bool {
        if !job.try_claim() {
            return false;
        }
        match exec_queue.try_send(Arc::clone(job)) {
            Ok(()) => {
                debug!(rule_id = %job.rule_id(), "job enqueued");
                true
            }
            Err(TrySendError::Full(_)) => {
                job.release();
                warn!(rule_id = %job.rule_id(), "execution queue full, skipping job");
                false
            }
            Err(TrySendError::Closed(_)) => {
                job.release();
                debug!(rule_id = %job.rule_id(), "execution queue closed");
                false
            }
        }
    }

    /// Get a job by rule id.
    pub fn get(&self, rule_id: &str) -> Option<&Arc<Job>> {
        self.jobs.get(rule_id)
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
