//! Tests for the scheduler module.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use cloudmon_core::AlertState;
    use tokio::sync::mpsc;

    use crate::scheduler::{Job, Scheduler};
    use crate::rule::{Rule, RuleState};
    use crate::testutil::StaticCondition;

    fn rule(id: &str, frequency: i64) -> Arc<Rule> {
        Arc::new(Rule::new(id, frequency).with_condition(Arc::new(StaticCondition::firing(true))))
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<Job>>) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(job) = rx.try_recv() {
            ids.push(job.rule_id().to_string());
        }
        ids
    }

    #[test]
    fn update_reuses_jobs_and_drops_removed_rules() {
        let mut s = Scheduler::new(10);
        s.update(vec![rule("a", 10), rule("b", 10)]);
        let a = Arc::clone(s.get("a").unwrap());
        assert!(a.try_claim());

        s.update(vec![rule("a", 30), rule("c", 10)]);
        assert_eq!(s.len(), 2);
        assert!(s.get("b").is_none());

        let a2 = s.get("a").unwrap();
        assert!(Arc::ptr_eq(&a, a2));
        assert!(a2.is_running());
        assert_eq!(a2.rule().frequency, 30);
    }

    #[test]
    fn update_restores_zero_offset() {
        let mut s = Scheduler::new(10);
        s.update(vec![rule("a", 10)]);
        s.get("a").unwrap().set_offset(0);
        s.update(vec![rule("a", 10)]);
        assert_eq!(s.get("a").unwrap().offset(), 1);
    }

    #[test]
    fn refresh_keeps_newer_live_state() {
        let mut s = Scheduler::new(10);
        s.update(vec![rule("a", 10)]);
        let job = Arc::clone(s.get("a").unwrap());
        let mut live = RuleState::default();
        live.transition(AlertState::Alerting, Utc::now());
        job.commit_state(live);

        // A stale snapshot from the store does not roll the state back.
        s.update(vec![rule("a", 10)]);
        assert_eq!(job.state().state, AlertState::Alerting);
    }

    #[tokio::test]
    async fn due_job_dispatches_on_following_tick() {
        let mut s = Scheduler::new(10);
        s.update(vec![rule("a", 10)]);
        let (tx, mut rx) = mpsc::channel(8);

        assert_eq!(s.tick(10, &tx), 0);
        assert!(s.get("a").unwrap().offset_wait());
        assert_eq!(s.tick(11, &tx), 1);
        assert_eq!(drain(&mut rx), vec!["a"]);
    }

    #[tokio::test]
    async fn running_job_is_never_dispatched_twice() {
        let mut s = Scheduler::new(10);
        s.update(vec![rule("a", 10)]);
        let (tx, mut rx) = mpsc::channel(8);

        let mut enqueued = 0;
        for now in 10..=31 {
            enqueued += s.tick(now, &tx);
        }
        assert_eq!(enqueued, 1);
        assert_eq!(drain(&mut rx), vec!["a"]);
        assert!(s.get("a").unwrap().is_running());
    }

    #[tokio::test]
    async fn released_job_dispatches_again() {
        let mut s = Scheduler::new(10);
        s.update(vec![rule("a", 10)]);
        let (tx, mut rx) = mpsc::channel(8);

        s.tick(10, &tx);
        s.tick(11, &tx);
        s.get("a").unwrap().release();
        s.tick(20, &tx);
        s.tick(21, &tx);
        assert_eq!(drain(&mut rx), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn paused_rules_are_skipped() {
        let mut s = Scheduler::new(10);
        let paused = Rule::new("p", 10)
            .with_condition(Arc::new(StaticCondition::firing(true)))
            .with_state(RuleState::new(AlertState::Paused, Utc::now()));
        s.update(vec![Arc::new(paused)]);
        let (tx, mut rx) = mpsc::channel(8);

        for now in 0..=40 {
            s.tick(now, &tx);
        }
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn min_interval_raises_short_frequencies() {
        let mut s = Scheduler::new(30);
        s.update(vec![rule("a", 5)]);
        let (tx, mut rx) = mpsc::channel(8);

        for now in 1..=31 {
            s.tick(now, &tx);
            if now == 29 {
                assert!(drain(&mut rx).is_empty());
            }
        }
        assert_eq!(drain(&mut rx), vec!["a"]);
    }

    #[tokio::test]
    async fn full_queue_does_not_block_or_leak_claims() {
        let mut s = Scheduler::new(10);
        s.update(vec![rule("a", 10), rule("b", 10)]);
        let (tx, mut rx) = mpsc::channel(1);

        s.tick(10, &tx);
        assert_eq!(s.tick(11, &tx), 1);

        let queued = drain(&mut rx);
        assert_eq!(queued.len(), 1);
        let skipped = if queued[0] == "a" { "b" } else { "a" };
        assert!(!s.get(skipped).unwrap().is_running());
    }

    #[tokio::test]
    async fn closed_queue_releases_claim() {
        let mut s = Scheduler::new(10);
        s.update(vec![rule("a", 10)]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        s.tick(10, &tx);
        assert_eq!(s.tick(11, &tx), 0);
        assert!(!s.get("a").unwrap().is_running());
    }
}
