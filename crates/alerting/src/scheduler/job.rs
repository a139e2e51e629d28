//! Mutable per-rule scheduling record.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::rule::{Rule, RuleState};

/// Scheduling record for one rule id.
///
/// The wrapped [`Rule`] is an immutable snapshot that is swapped wholesale on
/// every rule refresh. The rule's live alert state is kept next to it and is
/// only written through [`commit_state`](Job::commit_state), so evaluations
/// and the tick loop never race on it.
#[derive(Debug)]
pub struct Job {
    rule_id: String,
    offset: AtomicI64,
    offset_wait: AtomicBool,
    running: Mutex<bool>,
    rule: RwLock<Arc<Rule>>,
    state: Mutex<RuleState>,
}

impl Job {
    pub fn new(rule: Arc<Rule>) -> Self {
        Self {
            rule_id: rule.id.clone(),
            offset: AtomicI64::new(1),
            offset_wait: AtomicBool::new(false),
            running: Mutex::new(false),
            state: Mutex::new(rule.state),
            rule: RwLock::new(rule),
        }
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Current rule snapshot.
    pub fn rule(&self) -> Arc<Rule> {
        Arc::clone(&self.rule.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a refreshed rule snapshot. The live state is replaced only if
    /// the snapshot's state changed more recently (e.g. the rule was paused).
    pub(crate) fn set_rule(&self, rule: Arc<Rule>) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            *state = state.newest(rule.state);
        }
        *self.rule.write().unwrap_or_else(PoisonError::into_inner) = rule;
    }

    /// Live alert state.
    pub fn state(&self) -> RuleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write back the state computed by an evaluation.
    pub(crate) fn commit_state(&self, state: RuleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::Relaxed)
    }

    pub(crate) fn set_offset(&self, offset: i64) {
        self.offset.store(offset, Ordering::Relaxed);
    }

    pub fn offset_wait(&self) -> bool {
        self.offset_wait.load(Ordering::Relaxed)
    }

    pub(crate) fn set_offset_wait(&self, wait: bool) {
        self.offset_wait.store(wait, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the job running unless it already is. Returns whether the claim
    /// succeeded.
    pub(crate) fn try_claim(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if *running {
            return false;
        }
        *running = true;
        true
    }

    pub(crate) fn release(&self) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}
