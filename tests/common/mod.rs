#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use std::time::{Duration, Instant};

use strand::test_utils::init_test_logging;
use strand::{ActorHandle, ActorPhase, ActorScheduler, SchedulerConfig};

/// Generous bound for cross-thread assertions; real waits are far shorter.
pub const WAIT_BUDGET: Duration = Duration::from_secs(5);

/// Logging plus a running scheduler with test-friendly timings.
pub fn scheduler(thread_count: usize) -> ActorScheduler {
    init_test_logging();
    strand::test_utils::test_scheduler(thread_count)
}

/// Spins until `predicate` holds or [`WAIT_BUDGET`] elapses.
pub fn wait_until(predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_BUDGET;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::yield_now();
    }
    predicate()
}

/// Blocks until the actor reaches at least the given phase.
pub fn wait_for_phase(handle: &ActorHandle, phase: ActorPhase) {
    assert!(
        wait_until(|| handle.phase() >= phase),
        "actor {} never reached {:?}, stuck at {:?}",
        handle.id(),
        phase,
        handle.phase()
    );
}
