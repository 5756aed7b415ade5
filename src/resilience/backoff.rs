//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::config::schema::BackoffConfig;

/// A policy that computes the wait before the next retry.
pub trait Backoff: Send {
    /// Next wait, or `None` when retrying should stop.
    fn next_backoff(&mut self) -> Option<Duration>;

    /// Restore the initial interval and restart the elapsed-time clock.
    fn reset(&mut self);
}

/// Exponential backoff bounded by `max_interval`, with each wait jittered by
/// `±randomization_factor` of the nominal interval.
///
/// The first wait after a reset repeats the initial interval before growth
/// starts, so for 500ms / x2 / 5s the nominal waits are
/// 500, 500, 1000, 2000, 4000, 5000, 5000, ...
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub randomization_factor: f64,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Stop once this much time has passed since the last reset.
    pub max_elapsed_time: Option<Duration>,
    current_interval: Duration,
    growing: bool,
    start_time: Instant,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl ExponentialBackoff {
    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
        randomization_factor: f64,
    ) -> Self {
        Self {
            initial_interval,
            randomization_factor,
            multiplier,
            max_interval,
            max_elapsed_time: None,
            current_interval: initial_interval,
            growing: false,
            start_time: Instant::now(),
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        let mut backoff = Self::new(
            Duration::from_millis(config.initial_interval_ms),
            config.multiplier,
            Duration::from_millis(config.max_interval_ms),
            config.randomization_factor,
        );
        backoff.max_elapsed_time = config.max_elapsed_time_secs.map(Duration::from_secs);
        backoff
    }

    pub fn with_max_elapsed_time(mut self, max: Duration) -> Self {
        self.max_elapsed_time = Some(max);
        self
    }

    /// Nominal (pre-jitter) interval of the next wait.
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Time since the last reset.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn grow(&mut self) {
        let next = self.current_interval.as_secs_f64() * self.multiplier;
        self.current_interval = if next >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(next)
        };
    }

    fn randomize(&self, nominal: Duration) -> Duration {
        if self.randomization_factor <= 0.0 {
            return nominal;
        }
        let secs = nominal.as_secs_f64();
        let delta = self.randomization_factor * secs;
        let jittered = rand::thread_rng().gen_range((secs - delta)..=(secs + delta));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

impl Backoff for ExponentialBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_elapsed_time {
            if self.elapsed() > max {
                return None;
            }
        }

        let nominal = self.current_interval;
        if self.growing {
            self.grow();
        } else {
            self.growing = true;
        }
        Some(self.randomize(nominal))
    }

    fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.growing = false;
        self.start_time = Instant::now();
    }
}
