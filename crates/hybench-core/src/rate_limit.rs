//! Cooldown pacing between external calls.
//!
//! Every external call is followed by a mandatory cooldown plus uniform jitter
//! so a long batch stays under per-minute service quotas. All sleeping in a
//! run goes through one [`Pacer`], which also owns the jitter RNG and honours
//! the cancel token.

use crate::cancel::CancelToken;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Cooldown settings, `[rate_limit]` in config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Pause after every external call.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Upper bound of the uniform jitter added to each cooldown.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

const fn default_cooldown_ms() -> u64 {
    6_000
}

const fn default_jitter_ms() -> u64 {
    250
}

/// Blocking wait primitive, swappable so tests never sleep.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real sleeper. Wakes early once the cancel token fires.
#[derive(Debug, Clone, Default)]
pub struct ThreadSleeper {
    cancel: CancelToken,
}

impl ThreadSleeper {
    #[must_use]
    pub const fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Records requested sleeps without blocking. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All durations requested so far.
    #[must_use]
    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Sum of requested durations.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.recorded().into_iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Owns cooldown config, jitter RNG, and the sleeper for a run.
pub struct Pacer {
    limit: RateLimit,
    sleeper: Box<dyn Sleeper>,
    rng: StdRng,
    cancel: CancelToken,
}

impl Pacer {
    #[must_use]
    pub fn new(limit: RateLimit, sleeper: Box<dyn Sleeper>, cancel: CancelToken) -> Self {
        Self {
            limit,
            sleeper,
            rng: StdRng::from_entropy(),
            cancel,
        }
    }

    /// Same as [`Pacer::new`] with a fixed jitter seed.
    #[must_use]
    pub fn seeded(
        limit: RateLimit,
        sleeper: Box<dyn Sleeper>,
        cancel: CancelToken,
        seed: u64,
    ) -> Self {
        Self {
            limit,
            sleeper,
            rng: StdRng::seed_from_u64(seed),
            cancel,
        }
    }

    /// Mandatory pause after an external call.
    pub fn cooldown(&mut self) {
        let base = Duration::from_millis(self.limit.cooldown_ms);
        let jitter = self.jitter(self.limit.jitter_ms);
        self.pause(base + jitter);
    }

    /// Uniform jitter in `[0, max_ms]`.
    pub fn jitter(&mut self, max_ms: u64) -> Duration {
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.gen_range(0..=max_ms))
    }

    /// Sleep unless cancelled. Zero durations are skipped.
    pub fn pause(&self, duration: Duration) {
        if duration.is_zero() || self.cancel.is_cancelled() {
            return;
        }
        self.sleeper.sleep(duration);
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[must_use]
    pub const fn limit(&self) -> &RateLimit {
        &self.limit
    }
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer")
            .field("limit", &self.limit)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacer(limit: RateLimit, sleeper: &RecordingSleeper) -> Pacer {
        Pacer::seeded(limit, Box::new(sleeper.clone()), CancelToken::new(), 7)
    }

    #[test]
    fn cooldown_stays_within_jitter_window() {
        let sleeper = RecordingSleeper::new();
        let mut p = pacer(
            RateLimit {
                cooldown_ms: 500,
                jitter_ms: 100,
            },
            &sleeper,
        );
        for _ in 0..20 {
            p.cooldown();
        }
        let slept = sleeper.recorded();
        assert_eq!(slept.len(), 20);
        for d in slept {
            assert!(d >= Duration::from_millis(500));
            assert!(d <= Duration::from_millis(600));
        }
    }

    #[test]
    fn zero_cooldown_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let mut p = pacer(
            RateLimit {
                cooldown_ms: 0,
                jitter_ms: 0,
            },
            &sleeper,
        );
        p.cooldown();
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn cancelled_pacer_does_not_sleep() {
        let sleeper = RecordingSleeper::new();
        let cancel = CancelToken::new();
        let mut p = Pacer::seeded(
            RateLimit::default(),
            Box::new(sleeper.clone()),
            cancel.clone(),
            1,
        );
        cancel.cancel();
        p.cooldown();
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn thread_sleeper_wakes_on_cancel() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let started = Instant::now();
        ThreadSleeper::new(cancel).sleep(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn defaults_match_observed_quota() {
        let limit = RateLimit::default();
        assert_eq!(limit.cooldown_ms, 6_000);
        assert_eq!(limit.jitter_ms, 250);
    }
}
