//! Scheduling wrapper around one actor.
//!
//! An [`ActorRef`] is owned by exactly one runner at a time. It carries
//! the type-erased actor cell and a bounded ring of recent batch-duration
//! samples; the ring's mean is published to the shared actor record after
//! every batch so the scheduler can read load without touching runner
//! internals.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actor::{ActorPhase, ActorShared};
use crate::error::{panic_message, RunnerErrorHandler, StepFailure};

/// Runner-facing, type-erased view of an actor cell.
pub(crate) trait ActorTask: Send {
    /// Cross-thread record of this actor.
    fn shared(&self) -> &Arc<ActorShared>;
    /// True when at least one job is queued.
    fn has_pending(&self) -> bool;
    /// Pops and runs the next queued job, if any.
    fn execute_next(&mut self);
}

/// Fixed-capacity ring of batch durations, in nanoseconds. Overwrites the
/// oldest sample once full.
pub(crate) struct DurationRing {
    samples: Vec<u64>,
    capacity: usize,
    next: usize,
}

impl DurationRing {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    pub(crate) fn record(&mut self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        if self.samples.len() < self.capacity {
            self.samples.push(nanos);
        } else {
            self.samples[self.next] = nanos;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Mean of the recorded samples; zero when empty.
    pub(crate) fn mean_nanos(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let sum: u128 = self.samples.iter().map(|&n| u128::from(n)).sum();
        u64::try_from(sum / self.samples.len() as u128).unwrap_or(u64::MAX)
    }
}

/// Scheduling metadata wrapping one actor instance.
pub(crate) struct ActorRef {
    task: Box<dyn ActorTask>,
    samples: DurationRing,
}

impl ActorRef {
    pub(crate) fn new(task: Box<dyn ActorTask>, sample_count: usize) -> Self {
        Self {
            task,
            samples: DurationRing::new(sample_count),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<ActorShared> {
        self.task.shared()
    }

    /// Runs up to `limit` job steps, or until the queue drains.
    ///
    /// Records the batch's elapsed wall time in the sample ring and
    /// publishes the new mean. A panicking step is reported to
    /// `error_handler`; the remaining steps of the batch still run.
    /// Returns false without sampling when no job was pending.
    ///
    /// The batch ends as soon as the actor reaches `Closed`. Teardown
    /// is the last job allowed to run; a submission that slipped past
    /// the close fence concurrently with `close()` can still sit in
    /// the queue behind it and must never execute.
    pub(crate) fn execute_batch(&mut self, limit: u32, error_handler: &RunnerErrorHandler) -> bool {
        if !self.task.has_pending() {
            return false;
        }
        let started = Instant::now();
        let mut steps = 0;
        while steps < limit && self.task.has_pending() {
            let task = &mut self.task;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task.execute_next())) {
                let shared = self.task.shared();
                let failure = StepFailure {
                    actor_id: shared.id(),
                    actor_name: shared.name().to_string(),
                    message: panic_message(payload.as_ref()),
                };
                tracing::debug!(actor = %failure.actor_id, "job step panicked, forwarding to error handler");
                error_handler(failure);
            }
            steps += 1;
            if self.task.shared().phase() == ActorPhase::Closed {
                break;
            }
        }
        self.record(started.elapsed());
        true
    }

    fn record(&mut self, elapsed: Duration) {
        self.samples.record(elapsed);
        self.task.shared().publish_mean(self.samples.mean_nanos());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_has_zero_mean() {
        let ring = DurationRing::new(4);
        assert_eq!(ring.mean_nanos(), 0);
    }

    #[test]
    fn ring_means_partial_fill() {
        let mut ring = DurationRing::new(4);
        ring.record(Duration::from_nanos(100));
        ring.record(Duration::from_nanos(300));
        assert_eq!(ring.mean_nanos(), 200);
    }

    #[test]
    fn ring_overwrites_oldest_past_capacity() {
        let mut ring = DurationRing::new(3);
        for nanos in [10, 20, 30, 90] {
            ring.record(Duration::from_nanos(nanos));
        }
        // 10 was evicted: mean of {90, 20, 30}.
        assert_eq!(ring.mean_nanos(), (90 + 20 + 30) / 3);
    }

    #[test]
    fn single_slot_ring_tracks_last_sample() {
        let mut ring = DurationRing::new(1);
        ring.record(Duration::from_nanos(500));
        ring.record(Duration::from_nanos(700));
        assert_eq!(ring.mean_nanos(), 700);
    }
}
