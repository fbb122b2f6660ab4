//! Scheduler configuration.
//!
//! [`SchedulerConfig`] holds the concrete values that drive runtime
//! behavior. Construct it through [`SchedulerConfig::builder`]; the
//! builder validates every constraint at [`build`](SchedulerConfigBuilder::build)
//! and fails fast with a descriptive [`ConfigError`]. This is the only
//! validation layer; constructing an invalid scheduler is a programming
//! error, not a recoverable condition.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `thread_count` | available CPU parallelism |
//! | `base_iterations_per_actor` | 10 |
//! | `duration_sample_count` | 32 |
//! | `duration_sample_period` | 1 s |
//! | `imbalance_threshold` | 0.25 |
//! | `runner_idle_strategy` | [`BackoffIdleStrategy`] defaults |
//! | `runner_error_handler` | tracing-based logger |
//! | `scheduler_initial_backoff` | 10 s |
//! | `scheduler_max_backoff` | 60 s |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{logging_error_handler, RunnerErrorHandler};
use crate::idle::{BackoffIdleStrategy, IdleStrategy};

/// A violated configuration constraint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `thread_count` was zero.
    #[error("thread count must be greater than 0")]
    ThreadCount,
    /// `base_iterations_per_actor` was zero.
    #[error("base iterations per actor must be greater than 0")]
    BaseIterationsPerActor,
    /// `duration_sample_count` was zero.
    #[error("duration sample count must be greater than 0")]
    DurationSampleCount,
    /// `duration_sample_period` was absent.
    #[error("duration sample period must not be null")]
    DurationSamplePeriodMissing,
    /// `duration_sample_period` was zero.
    #[error("duration sample period must be greater than PT0S")]
    DurationSamplePeriodZero,
    /// `imbalance_threshold` exceeded 1.0.
    #[error("imbalance threshold must be less than or equal to 1.0")]
    ImbalanceThresholdTooHigh,
    /// `imbalance_threshold` was below 0.0.
    #[error("imbalance threshold must be greater than or equal to 0.0")]
    ImbalanceThresholdTooLow,
    /// `runner_idle_strategy` was absent.
    #[error("runner idle strategy must not be null")]
    RunnerIdleStrategyMissing,
    /// `runner_error_handler` was absent.
    #[error("runner error handler must not be null")]
    RunnerErrorHandlerMissing,
    /// `scheduler_initial_backoff` was absent.
    #[error("scheduler initial backoff must not be null")]
    SchedulerInitialBackoffMissing,
    /// `scheduler_initial_backoff` was zero.
    #[error("scheduler initial backoff must be greater than PT0S")]
    SchedulerInitialBackoffZero,
    /// `scheduler_max_backoff` was absent.
    #[error("scheduler max backoff must not be null")]
    SchedulerMaxBackoffMissing,
    /// `scheduler_max_backoff` did not exceed the configured initial
    /// backoff (carried here for the message).
    #[error("scheduler max backoff must be greater than {0}")]
    SchedulerMaxBackoffTooSmall(IsoDuration),
}

/// Renders a [`Duration`] in ISO-8601 seconds form: `PT0S`, `PT10S`,
/// `PT2.5S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoDuration(pub Duration);

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        let nanos = self.0.subsec_nanos();
        if nanos == 0 {
            write!(f, "PT{secs}S")
        } else {
            let frac = format!("{nanos:09}");
            write!(f, "PT{secs}.{}S", frac.trim_end_matches('0'))
        }
    }
}

/// Immutable, validated scheduler configuration.
#[derive(Clone)]
pub struct SchedulerConfig {
    thread_count: usize,
    base_iterations_per_actor: u32,
    duration_sample_count: usize,
    duration_sample_period: Duration,
    imbalance_threshold: f64,
    runner_idle_strategy: Arc<dyn IdleStrategy>,
    runner_error_handler: RunnerErrorHandler,
    scheduler_initial_backoff: Duration,
    scheduler_max_backoff: Duration,
}

impl SchedulerConfig {
    /// Starts a builder with default values.
    #[must_use]
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }

    /// Number of runner (worker) threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Job steps executed per actor per runner pass before moving on.
    #[must_use]
    pub fn base_iterations_per_actor(&self) -> u32 {
        self.base_iterations_per_actor
    }

    /// Capacity of each actor's duration-sample ring.
    #[must_use]
    pub fn duration_sample_count(&self) -> usize {
        self.duration_sample_count
    }

    /// Minimum time between scheduler rebalancing passes.
    #[must_use]
    pub fn duration_sample_period(&self) -> Duration {
        self.duration_sample_period
    }

    /// Relative load gap between the busiest and idlest runner that
    /// triggers a rebalance, in `[0.0, 1.0]`.
    #[must_use]
    pub fn imbalance_threshold(&self) -> f64 {
        self.imbalance_threshold
    }

    /// Backoff policy runners apply when no actor has work.
    #[must_use]
    pub fn runner_idle_strategy(&self) -> &Arc<dyn IdleStrategy> {
        &self.runner_idle_strategy
    }

    /// Callback for panics escaping a job step.
    #[must_use]
    pub fn runner_error_handler(&self) -> &RunnerErrorHandler {
        &self.runner_error_handler
    }

    /// First control-loop delay after a rebalance pass found no work.
    #[must_use]
    pub fn scheduler_initial_backoff(&self) -> Duration {
        self.scheduler_initial_backoff
    }

    /// Ceiling of the control-loop backoff.
    #[must_use]
    pub fn scheduler_max_backoff(&self) -> Duration {
        self.scheduler_max_backoff
    }
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("thread_count", &self.thread_count)
            .field("base_iterations_per_actor", &self.base_iterations_per_actor)
            .field("duration_sample_count", &self.duration_sample_count)
            .field("duration_sample_period", &self.duration_sample_period)
            .field("imbalance_threshold", &self.imbalance_threshold)
            .field("runner_idle_strategy", &self.runner_idle_strategy)
            .field("runner_error_handler", &"<handler>")
            .field("scheduler_initial_backoff", &self.scheduler_initial_backoff)
            .field("scheduler_max_backoff", &self.scheduler_max_backoff)
            .finish()
    }
}

/// Fluent, move-based builder for [`SchedulerConfig`].
///
/// Duration- and handler-valued setters accept `impl Into<Option<T>>`, so
/// a plain value works and an explicit `None` is representable; an absent
/// value is rejected at [`build`](Self::build) with the matching
/// `must not be null` error.
#[derive(Clone)]
pub struct SchedulerConfigBuilder {
    thread_count: usize,
    base_iterations_per_actor: u32,
    duration_sample_count: usize,
    duration_sample_period: Option<Duration>,
    imbalance_threshold: f64,
    runner_idle_strategy: Option<Arc<dyn IdleStrategy>>,
    runner_error_handler: Option<RunnerErrorHandler>,
    scheduler_initial_backoff: Option<Duration>,
    scheduler_max_backoff: Option<Duration>,
}

impl SchedulerConfigBuilder {
    /// Creates a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            thread_count: default_thread_count(),
            base_iterations_per_actor: 10,
            duration_sample_count: 32,
            duration_sample_period: Some(Duration::from_secs(1)),
            imbalance_threshold: 0.25,
            runner_idle_strategy: Some(Arc::new(BackoffIdleStrategy::default())),
            runner_error_handler: Some(logging_error_handler()),
            scheduler_initial_backoff: Some(Duration::from_secs(10)),
            scheduler_max_backoff: Some(Duration::from_secs(60)),
        }
    }

    /// Sets the number of runner threads.
    #[must_use]
    pub fn thread_count(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    /// Sets the per-pass iteration budget per actor.
    #[must_use]
    pub fn base_iterations_per_actor(mut self, iterations: u32) -> Self {
        self.base_iterations_per_actor = iterations;
        self
    }

    /// Sets the duration-sample ring capacity.
    #[must_use]
    pub fn duration_sample_count(mut self, count: usize) -> Self {
        self.duration_sample_count = count;
        self
    }

    /// Sets the minimum time between rebalancing passes.
    #[must_use]
    pub fn duration_sample_period(mut self, period: impl Into<Option<Duration>>) -> Self {
        self.duration_sample_period = period.into();
        self
    }

    /// Sets the rebalance trigger threshold.
    #[must_use]
    pub fn imbalance_threshold(mut self, threshold: f64) -> Self {
        self.imbalance_threshold = threshold;
        self
    }

    /// Sets the runner idle strategy.
    #[must_use]
    pub fn runner_idle_strategy(
        mut self,
        strategy: impl Into<Option<Arc<dyn IdleStrategy>>>,
    ) -> Self {
        self.runner_idle_strategy = strategy.into();
        self
    }

    /// Sets the step-panic handler.
    #[must_use]
    pub fn runner_error_handler(
        mut self,
        handler: impl Into<Option<RunnerErrorHandler>>,
    ) -> Self {
        self.runner_error_handler = handler.into();
        self
    }

    /// Sets the initial control-loop backoff.
    #[must_use]
    pub fn scheduler_initial_backoff(mut self, backoff: impl Into<Option<Duration>>) -> Self {
        self.scheduler_initial_backoff = backoff.into();
        self
    }

    /// Sets the control-loop backoff ceiling.
    #[must_use]
    pub fn scheduler_max_backoff(mut self, backoff: impl Into<Option<Duration>>) -> Self {
        self.scheduler_max_backoff = backoff.into();
        self
    }

    /// Validates every constraint and produces the immutable config.
    pub fn build(self) -> Result<SchedulerConfig, ConfigError> {
        if self.thread_count == 0 {
            return Err(ConfigError::ThreadCount);
        }
        if self.base_iterations_per_actor == 0 {
            return Err(ConfigError::BaseIterationsPerActor);
        }
        if self.duration_sample_count == 0 {
            return Err(ConfigError::DurationSampleCount);
        }
        let duration_sample_period = self
            .duration_sample_period
            .ok_or(ConfigError::DurationSamplePeriodMissing)?;
        if duration_sample_period.is_zero() {
            return Err(ConfigError::DurationSamplePeriodZero);
        }
        if self.imbalance_threshold > 1.0 {
            return Err(ConfigError::ImbalanceThresholdTooHigh);
        }
        if self.imbalance_threshold < 0.0 || self.imbalance_threshold.is_nan() {
            return Err(ConfigError::ImbalanceThresholdTooLow);
        }
        let runner_idle_strategy = self
            .runner_idle_strategy
            .ok_or(ConfigError::RunnerIdleStrategyMissing)?;
        let runner_error_handler = self
            .runner_error_handler
            .ok_or(ConfigError::RunnerErrorHandlerMissing)?;
        let scheduler_initial_backoff = self
            .scheduler_initial_backoff
            .ok_or(ConfigError::SchedulerInitialBackoffMissing)?;
        if scheduler_initial_backoff.is_zero() {
            return Err(ConfigError::SchedulerInitialBackoffZero);
        }
        let scheduler_max_backoff = self
            .scheduler_max_backoff
            .ok_or(ConfigError::SchedulerMaxBackoffMissing)?;
        if scheduler_max_backoff <= scheduler_initial_backoff {
            return Err(ConfigError::SchedulerMaxBackoffTooSmall(IsoDuration(
                scheduler_initial_backoff,
            )));
        }

        Ok(SchedulerConfig {
            thread_count: self.thread_count,
            base_iterations_per_actor: self.base_iterations_per_actor,
            duration_sample_count: self.duration_sample_count,
            duration_sample_period,
            imbalance_threshold: self.imbalance_threshold,
            runner_idle_strategy,
            runner_error_handler,
            scheduler_initial_backoff,
            scheduler_max_backoff,
        })
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map_or(1, std::num::NonZeroUsize::get)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = SchedulerConfig::builder().build().expect("default config");
        assert!(config.thread_count() >= 1);
        assert_eq!(config.base_iterations_per_actor(), 10);
        assert_eq!(config.duration_sample_count(), 32);
        assert_eq!(config.duration_sample_period(), Duration::from_secs(1));
        assert!((config.imbalance_threshold() - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.scheduler_initial_backoff(), Duration::from_secs(10));
        assert_eq!(config.scheduler_max_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn iso_duration_rendering() {
        assert_eq!(IsoDuration(Duration::ZERO).to_string(), "PT0S");
        assert_eq!(IsoDuration(Duration::from_secs(10)).to_string(), "PT10S");
        assert_eq!(
            IsoDuration(Duration::from_millis(2500)).to_string(),
            "PT2.5S"
        );
        assert_eq!(
            IsoDuration(Duration::from_micros(1)).to_string(),
            "PT0.000001S"
        );
    }

    #[test]
    fn nan_threshold_is_rejected() {
        let err = SchedulerConfig::builder()
            .imbalance_threshold(f64::NAN)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ImbalanceThresholdTooLow);
    }
}
