//! Deterministic test doubles.
//!
//! A [`Clock`] implementation whose notion of "now" only moves when a
//! test calls [`ManualClock::advance`], so that delayed-send ordering is
//! pinned down instead of racing real wall-clock time. [`Recorder`] is the
//! accompanying hook: tests attach it as a transition/event listener and
//! assert on the recorded sequence afterwards.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::clock::Clock;

/// A [`Clock`] driven entirely by explicit [`ManualClock::advance`] calls.
///
/// `sleep(duration)` resolves as soon as the clock's time reaches or
/// passes `now() + duration`; it never resolves on its own.
#[derive(Clone)]
pub struct ManualClock {
    tx: Arc<watch::Sender<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        let (tx, _rx) = watch::channel(start);
        Self { tx: Arc::new(tx) }
    }

    /// Move the clock forward by `delta`, waking any `sleep` futures whose
    /// deadline has now passed.
    pub fn advance(&self, delta: Duration) {
        let delta = chrono::Duration::from_std(delta).expect("delta overflowed chrono::Duration");
        let next = *self.tx.borrow() + delta;
        let _ = self.tx.send(next);
    }

    /// Jump directly to an absolute time.
    pub fn set(&self, time: DateTime<Utc>) {
        let _ = self.tx.send(time);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.tx.borrow()
    }

    async fn sleep(&self, duration: Duration) {
        let duration = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        let deadline = self.now() + duration;
        if self.now() >= deadline {
            return;
        }

        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow() >= deadline {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender dropped; nothing more will ever advance the clock.
                return;
            }
        }
    }
}

/// Records a flat, timestamp-free log of interpreter events for assertions
/// in integration tests, in lieu of a full DST scheduler harness.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// A snapshot of everything recorded so far, in order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}
