//! Helpers shared by the unit and integration tests.
//!
//! The defaults in [`SchedulerConfig`] are tuned for long-running
//! processes; [`test_config`] shrinks the rebalance period and backoff
//! window to milliseconds so load-balancing tests converge within a
//! test timeout, and [`test_scheduler`] spawns a pool from it.
//! [`init_test_logging`] wires `tracing` to the test writer exactly
//! once per process, with thread ids on so interleavings across runner
//! threads stay readable. The macros cover structured progress logging
//! and assertions on resolved [`ActorFuture`](crate::ActorFuture)
//! outcomes.
//!
//! ```
//! use strand::test_utils::{init_test_logging, test_scheduler};
//!
//! fn my_scheduler_test() {
//!     init_test_logging();
//!     let scheduler = test_scheduler(2);
//!     scheduler.shutdown();
//! }
//! ```

use std::sync::Once;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::scheduler::ActorScheduler;

static INIT_LOGGING: Once = Once::new();

/// Routes `tracing` output to the test harness at trace level.
///
/// Idempotent; every test can call it unconditionally.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Like [`init_test_logging`], capped at `level`.
///
/// Only the first call in the process takes effect.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(level)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Configuration with short rebalance timings so tests settle quickly.
#[must_use]
pub fn test_config(thread_count: usize) -> SchedulerConfig {
    SchedulerConfig::builder()
        .thread_count(thread_count)
        .duration_sample_period(Duration::from_millis(10))
        .scheduler_initial_backoff(Duration::from_millis(20))
        .scheduler_max_backoff(Duration::from_millis(100))
        .build()
        .expect("test scheduler configuration is valid")
}

/// Spawn a scheduler from [`test_config`].
#[must_use]
pub fn test_scheduler(thread_count: usize) -> ActorScheduler {
    ActorScheduler::new(test_config(thread_count)).expect("test scheduler spawns")
}

/// Log the start of a test phase.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Assert that a resolved future outcome is Ok with a specific value.
#[macro_export]
macro_rules! assert_resolved_ok {
    ($outcome:expr, $expected:expr) => {
        match $outcome {
            Ok(v) => assert_eq!(v, $expected),
            Err(e) => unreachable!("expected Ok({:?}), got Err({e})", $expected),
        }
    };
}

/// Assert that a resolved future outcome failed with the given message.
#[macro_export]
macro_rules! assert_resolved_err {
    ($outcome:expr, $message:expr) => {
        match $outcome {
            Ok(_) => unreachable!("expected a failed future"),
            Err(e) => assert_eq!(e.to_string(), $message),
        }
    };
}
