//! Idle strategies for runner threads.
//!
//! A runner that completes a full scan without finding a single pending
//! job applies its idle strategy before scanning again. The default
//! [`BackoffIdleStrategy`] escalates from busy-spinning through yielding
//! to parked waits with a doubling timeout, trading wake-up latency for
//! CPU only after sustained idleness.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A mechanism for parking and unparking a thread.
///
/// Cloneable; all clones share the same notification state. An unpark
/// issued before the park call is not lost.
#[derive(Debug, Clone, Default)]
pub struct Parker {
    inner: Arc<ParkerInner>,
}

#[derive(Debug, Default)]
struct ParkerInner {
    notified: Mutex<bool>,
    condvar: Condvar,
}

impl Parker {
    /// Creates a new parker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks the current thread until notified.
    pub fn park(&self) {
        let mut notified = self.inner.notified.lock();
        while !*notified {
            self.inner.condvar.wait(&mut notified);
        }
        *notified = false;
    }

    /// Parks the current thread until notified or the timeout elapses.
    pub fn park_timeout(&self, timeout: Duration) {
        let mut notified = self.inner.notified.lock();
        if !*notified {
            let _ = self.inner.condvar.wait_for(&mut notified, timeout);
        }
        *notified = false;
    }

    /// Unparks the parked thread, or makes the next park return
    /// immediately.
    pub fn unpark(&self) {
        {
            let mut notified = self.inner.notified.lock();
            *notified = true;
        }
        self.inner.condvar.notify_one();
    }
}

/// Backoff policy a runner applies when it finds no actor with pending
/// work.
///
/// `idle_passes` counts consecutive work-free scans; the runner resets it
/// to zero whenever a scan executed at least one job. Implementations must
/// park on the supplied [`Parker`] (never sleep unconditionally) so that a
/// cross-thread job enqueue or actor handoff can cut the wait short.
pub trait IdleStrategy: Send + Sync + fmt::Debug {
    /// Invoked once per work-free scan.
    fn idle(&self, idle_passes: u32, parker: &Parker);
}

/// The default idle strategy: spin, then yield, then park with a doubling
/// timeout.
#[derive(Debug, Clone)]
pub struct BackoffIdleStrategy {
    /// Number of work-free passes spent busy-spinning.
    pub spin_passes: u32,
    /// Pass count (cumulative) up to which the thread yields instead.
    pub yield_passes: u32,
    /// First parked wait duration.
    pub min_park: Duration,
    /// Parked wait ceiling.
    pub max_park: Duration,
}

impl Default for BackoffIdleStrategy {
    fn default() -> Self {
        Self {
            spin_passes: 10,
            yield_passes: 30,
            min_park: Duration::from_micros(64),
            max_park: Duration::from_millis(1),
        }
    }
}

impl BackoffIdleStrategy {
    fn park_duration(&self, idle_passes: u32) -> Duration {
        let steps = idle_passes.saturating_sub(self.yield_passes).min(16);
        self.min_park.saturating_mul(1 << steps).min(self.max_park)
    }
}

impl IdleStrategy for BackoffIdleStrategy {
    fn idle(&self, idle_passes: u32, parker: &Parker) {
        if idle_passes < self.spin_passes {
            std::hint::spin_loop();
        } else if idle_passes < self.yield_passes {
            std::thread::yield_now();
        } else {
            parker.park_timeout(self.park_duration(idle_passes));
        }
    }
}
