//! Rate limiting utilities for Parley
//!
//! Provides the process-wide rate governor that spaces out outbound calls to
//! the upstream completion service, plus the clock abstraction it (and the
//! relay's backoff loops) suspend through.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::retry::jitter;

/// Source of time and non-blocking suspension.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock for tests and simulations: `sleep` returns immediately,
/// advances virtual time and records the requested duration.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Moves virtual time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        self.state.lock().offset += by;
    }

    pub fn elapsed(&self) -> Duration {
        self.state.lock().offset
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.state.lock().sleeps.iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.state.lock().offset
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.state.lock();
            state.sleeps.push(duration);
            state.offset += duration;
        }
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorConfig {
    pub min_interval: Duration,
    pub jitter_max: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(3),
            jitter_max: Duration::from_secs(1),
        }
    }
}

/// Shared rate-limit clock.
///
/// `last_request_at` only moves forward and is written by callers once an
/// upstream call has an outcome. `last_dispatch_at` is stamped by the governor
/// when it releases a caller, so a call still in flight also holds back the
/// next one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateState {
    pub last_request_at: Option<Instant>,
    pub last_dispatch_at: Option<Instant>,
}

impl RateState {
    fn anchor(&self) -> Option<Instant> {
        match (self.last_request_at, self.last_dispatch_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn remaining(&self, now: Instant, min_interval: Duration) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.anchor()?);
        (elapsed < min_interval).then(|| min_interval - elapsed)
    }
}

/// Single global gate all outbound calls pass through.
///
/// Waiting callers queue on a tokio mutex, which hands the lock out in FIFO
/// order. That ordering is an assumption about tokio, not a fairness
/// guarantee of this type.
pub struct RateGovernor {
    config: GovernorConfig,
    clock: Arc<dyn Clock>,
    queue: tokio::sync::Mutex<()>,
    state: Mutex<RateState>,
}

impl RateGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    pub fn with_clock(config: GovernorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            queue: tokio::sync::Mutex::new(()),
            state: Mutex::new(RateState::default()),
        }
    }

    pub fn config(&self) -> GovernorConfig {
        self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Suspends until the next upstream call may be dispatched.
    ///
    /// Returns the total time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let _turn = self.queue.lock().await;
        let mut waited = Duration::ZERO;
        loop {
            let remaining = {
                let mut state = self.state.lock();
                let now = self.clock.now();
                match state.remaining(now, self.config.min_interval) {
                    Some(remaining) => remaining,
                    None => {
                        state.last_dispatch_at = Some(now);
                        return waited;
                    }
                }
            };
            let pause = remaining + jitter(self.config.jitter_max);
            info!(
                "Requests too frequent, waiting {:.2}s before dispatch",
                pause.as_secs_f64()
            );
            self.clock.sleep(pause).await;
            waited += pause;
        }
    }

    /// Marks the outcome of an upstream call as known.
    pub fn record_completion(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let stamp = match state.last_request_at {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        state.last_request_at = Some(stamp);
        debug!("Recorded upstream call completion");
    }

    pub fn snapshot(&self) -> RateState {
        *self.state.lock()
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(GovernorConfig::default())
    }
}
