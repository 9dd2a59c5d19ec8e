use backoff::SystemClock;
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Poll delay that doubles on demand and snaps back to its start value.
///
/// Reads the interval straight from the backoff state instead of
/// `next_backoff()`'s return value, which carries jitter even when the
/// randomization factor is zero.
pub struct PollDelay {
    backoff: ExponentialBackoff<SystemClock>,
}

impl PollDelay {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let backoff = ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: max.max(initial),
            max_elapsed_time: None,
            ..Default::default()
        };
        Self { backoff }
    }

    pub fn current(&self) -> Duration {
        self.backoff.current_interval
    }

    /// Doubles the delay (capped) and returns the new value.
    pub fn escalate(&mut self) -> Duration {
        let _ = self.backoff.next_backoff();
        self.backoff.current_interval
    }

    pub fn reset(&mut self) {
        self.backoff.reset();
    }

    /// Sleeps for the current delay.
    pub async fn wait(&self) {
        tokio::time::sleep(self.current()).await;
    }
}

/// Keeps cancel calls at least one window apart. Shared by feed and report
/// cancellation of one client.
#[derive(Debug, Default)]
pub struct CancelGate {
    last_call: Option<Instant>,
}

impl CancelGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps out whatever is left of `window` since the previous call
    /// finished.
    pub async fn wait(&mut self, window: Duration) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < window {
                let remaining = window - elapsed;
                debug!("Waiting {:?} before the next cancel call", remaining);
                tokio::time::sleep(remaining).await;
            }
        }
    }

    /// Records that a cancel call just finished.
    pub fn mark(&mut self) {
        self.last_call = Some(Instant::now());
    }
}
