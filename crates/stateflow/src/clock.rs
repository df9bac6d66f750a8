//! Abstract timer consumed by delayed `send` actions.
//!
//! The machine compiler and state-value representation are external
//! collaborators of this crate; [`Clock`] is the seam for the timer.
//! Production code gets real wall-clock time and
//! `tokio::time::sleep` from [`SystemClock`]; tests that need to pin down
//! the exact ordering of two timers with equal delay use
//! [`crate::dst::ManualClock`] instead.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Controls the interpreter's view of time for delayed sends.
///
/// `sleep` is the only operation the scheduler depends on: a delayed
/// `send` action spawns a task that awaits `clock.sleep(delay)` and then
/// delivers the event. Cancelling the send aborts that task, so `sleep`
/// never needs its own cancellation handle.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time, used only for diagnostics (e.g. devtools
    /// timestamps) — never consulted to decide whether a timer has fired.
    fn now(&self) -> DateTime<Utc>;

    /// Resolve after `duration` has elapsed.
    async fn sleep(&self, duration: Duration);
}

/// The default clock, backed by real time and `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
