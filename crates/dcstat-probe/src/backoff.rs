//! Exponential backoff with jitter, and a retry helper built on it.
//!
//! The base delay starts at `initial`, is multiplied by `multiplier` after
//! every consecutive failure and is capped at `max`. Each wait draws a
//! random delay around the base so that probes for different endpoints do
//! not reconnect in lockstep. One success resets the base to `initial`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::debug;

use dcstat_core::config::BackoffSettings;

use crate::error::{ProbeError, ProbeResult};

/// Tracks consecutive failures and the delay before the next attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    settings: BackoffSettings,
    /// Base delay for the next failure, before jitter.
    current: Duration,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(settings: BackoffSettings) -> Self {
        Self {
            settings,
            current: settings.initial,
            consecutive_failures: 0,
        }
    }

    /// Base delay the next failure will wait, before jitter.
    pub fn current_interval(&self) -> Duration {
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current = self.scaled(base, self.settings.multiplier);
        self.jittered(base)
    }

    /// Record a success.
    pub fn reset(&mut self) {
        self.current = self.settings.initial;
        self.consecutive_failures = 0;
    }

    fn jittered(&self, base: Duration) -> Duration {
        let jitter = self.settings.jitter.min(1.0);
        if jitter.is_nan() || jitter <= 0.0 {
            return base;
        }
        let factor = rand::rng().random_range(1.0 - jitter..=1.0 + jitter);
        self.scaled(base, factor)
    }

    /// `base * factor`, capped at `max`. Saturates instead of overflowing.
    fn scaled(&self, base: Duration, factor: f64) -> Duration {
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(self.settings.max)
            .min(self.settings.max)
    }
}

/// Resolves once shutdown has been signalled or the sender is gone.
pub async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Run `attempt` until it succeeds, sleeping with `backoff` between
/// failures.
///
/// Fails only with [`ProbeError::Cancelled`], which is returned as soon as
/// `shutdown` fires, whether mid-attempt or mid-delay.
pub async fn with_retry<T, E, F, Fut>(
    backoff: &mut Backoff,
    shutdown: &mut watch::Receiver<bool>,
    op: &str,
    mut attempt: F,
) -> ProbeResult<T>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        if *shutdown.borrow() {
            return Err(ProbeError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = shutdown_signalled(shutdown) => return Err(ProbeError::Cancelled),
            result = attempt() => result,
        };

        match result {
            Ok(value) => {
                backoff.reset();
                return Ok(value);
            }
            Err(e) => {
                let delay = backoff.next_delay();
                debug!(
                    op,
                    error = %e,
                    failures = backoff.consecutive_failures(),
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, backing off"
                );
                tokio::select! {
                    biased;
                    _ = shutdown_signalled(shutdown) => return Err(ProbeError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
