//! Gapless one-second clock source.
//!
//! The ticker emits `last + 1s`, `last + 2s`, ... and never skips a second.
//! Each tick is released once the wall clock passes `tick + offset`; when the
//! consumer falls behind, overdue ticks are sent back-to-back. The tick channel
//! holds a single tick, so a blocked `send` is the backpressure: the producer
//! waits until the consumer has taken the previous tick.

use chrono::{DateTime, DurationRound, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Wall-clock reading derived from the tokio clock, so paused-time tests
/// drive the ticker deterministically.
#[derive(Debug, Clone, Copy)]
struct Clock {
    wall: DateTime<Utc>,
    instant: Instant,
}

impl Clock {
    fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            wall,
            instant: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.instant.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

/// Handle to a running ticker task.
pub struct Ticker {
    ticks: mpsc::Receiver<DateTime<Utc>>,
    offset: watch::Sender<chrono::Duration>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Start ticking at `last + 1s`. `last` is truncated to whole seconds.
    pub fn spawn(last: DateTime<Utc>, offset: chrono::Duration, cancel: CancellationToken) -> Self {
        Self::spawn_with_clock(last, Clock::starting_at(Utc::now()), offset, cancel)
    }

    fn spawn_with_clock(
        last: DateTime<Utc>,
        clock: Clock,
        offset: chrono::Duration,
        cancel: CancellationToken,
    ) -> Self {
        let last = last
            .duration_trunc(chrono::Duration::seconds(1))
            .unwrap_or(last);
        let (tick_tx, ticks) = mpsc::channel(1);
        let (offset, offset_rx) = watch::channel(offset);
        let handle = tokio::spawn(run(last, clock, tick_tx, offset_rx, cancel));
        Self {
            ticks,
            offset,
            handle,
        }
    }

    /// Next tick, or `None` once the ticker has stopped.
    pub async fn tick(&mut self) -> Option<DateTime<Utc>> {
        self.ticks.recv().await
    }

    /// Shift the deadline of every following tick. Tick values are unaffected.
    pub fn set_offset(&self, offset: chrono::Duration) {
        self.offset.send_replace(offset);
    }

    pub fn offset(&self) -> chrono::Duration {
        *self.offset.borrow()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    mut last: DateTime<Utc>,
    clock: Clock,
    ticks: mpsc::Sender<DateTime<Utc>>,
    mut offset_rx: watch::Receiver<chrono::Duration>,
    cancel: CancellationToken,
) {
    let one_second = chrono::Duration::seconds(1);
    let mut offset_open = true;

    loop {
        let next = last + one_second;
        let deadline = next + *offset_rx.borrow();
        let now = clock.now();

        if now >= deadline {
            tokio::select! {
                sent = ticks.send(next) => {
                    if sent.is_err() {
                        debug!("tick receiver dropped, stopping ticker");
                        return;
                    }
                    last = next;
                }
                _ = cancel.cancelled() => return,
            }
            continue;
        }

        let wait = (deadline - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = offset_rx.changed(), if offset_open => {
                if changed.is_err() {
                    offset_open = false;
                }
            }
            _ = cancel.cancelled() => return,
        }
    }
}
