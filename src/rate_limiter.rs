//! Call pacing for the mail provider API
//!
//! The provider publishes a per-user quota as calls per minute. Rather
//! than bursting up to the ceiling and handling 429s, this limiter
//! spaces calls out evenly: a minimum interval between consecutive
//! calls, derived from the quota with a safety margin so the engine
//! never consumes more than ~80% of nominal capacity.
//!
//! The clock is monotonic (`std::time::Instant`), so wall-clock
//! adjustments cannot shorten or lengthen the enforced interval.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::trace;

/// Fraction of the published quota the engine is allowed to use
pub const DEFAULT_SAFETY_FACTOR: f64 = 0.8;

/// Minimum-interval rate limiter shared by every provider call in a run
///
/// One logical caller at a time is the expected usage; the mutex makes
/// the "last call time" update safe if the host ever shares the
/// limiter across tasks.
#[derive(Debug)]
pub struct ApiRateLimiter {
    inner: Arc<Mutex<LimiterState>>,
    min_interval: Duration,
}

#[derive(Debug)]
struct LimiterState {
    /// When the previous call was admitted; None before the first call
    last_call: Option<Instant>,
    /// Total calls admitted (for stats)
    total_calls: u64,
    /// Total time spent waiting (for stats)
    total_waited: Duration,
}

impl ApiRateLimiter {
    /// Create a limiter from the provider's published quota
    ///
    /// # Arguments
    /// * `calls_per_minute` - nominal quota ceiling
    /// * `safety_factor` - fraction of the ceiling to actually use (0..=1]
    pub fn from_quota(calls_per_minute: u32, safety_factor: f64) -> Self {
        let factor = safety_factor.clamp(0.05, 1.0);
        let effective_rate = (calls_per_minute.max(1) as f64) * factor;
        let min_interval = Duration::from_secs_f64(60.0 / effective_rate);
        Self::with_interval(min_interval)
    }

    /// Create a limiter with an explicit minimum interval between calls
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LimiterState {
                last_call: None,
                total_calls: 0,
                total_waited: Duration::ZERO,
            })),
            min_interval,
        }
    }

    /// The enforced minimum interval between consecutive calls
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until the minimum interval since the previous call has
    /// elapsed, then record the new call time
    ///
    /// The first call is admitted immediately.
    pub async fn throttle(&self) {
        let wait = {
            let mut state = self.inner.lock().await;
            let now = Instant::now();

            let wait = match state.last_call {
                Some(last) => self.min_interval.saturating_sub(now.duration_since(last)),
                None => Duration::ZERO,
            };

            // Record the admission time up front; the slot is reserved
            // even while we sleep, so a second caller queues behind it.
            state.last_call = Some(now + wait);
            state.total_calls += 1;
            state.total_waited += wait;
            wait
        };

        if !wait.is_zero() {
            trace!("Throttling provider call for {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Snapshot of pacing statistics
    pub async fn stats(&self) -> LimiterStats {
        let state = self.inner.lock().await;
        LimiterStats {
            total_calls: state.total_calls,
            total_waited: state.total_waited,
            min_interval: self.min_interval,
        }
    }
}

impl Clone for ApiRateLimiter {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            min_interval: self.min_interval,
        }
    }
}

/// Statistics about call pacing
#[derive(Debug, Clone)]
pub struct LimiterStats {
    /// Total calls admitted since creation
    pub total_calls: u64,
    /// Cumulative time callers spent waiting
    pub total_waited: Duration,
    /// The enforced interval
    pub min_interval: Duration,
}
