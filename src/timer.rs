//! Deadline service backing `run_delayed` and `run_at_fixed_rate`.
//!
//! A single binary heap of armed deadlines, drained by the scheduler
//! thread between rebalance passes. Callbacks are cheap by construction:
//! each one only enqueues a job on its actor, so firing on the control
//! thread never blocks runners.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use parking_lot::Mutex;

use crate::idle::Parker;

type TimerCallback = Box<dyn FnOnce() + Send>;

struct TimerEntry {
    deadline: Instant,
    /// Insertion order, so equal deadlines fire in arming order.
    generation: u64,
    callback: TimerCallback,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap yields the earliest deadline.
        (other.deadline, other.generation).cmp(&(self.deadline, self.generation))
    }
}

struct HeapState {
    entries: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

/// Shared deadline heap. Arming is cross-thread; draining belongs to the
/// control thread.
pub(crate) struct TimerService {
    state: Mutex<HeapState>,
    /// Control thread's parker, kicked when a new earliest deadline lands.
    wake: Parker,
}

impl TimerService {
    pub(crate) fn new(wake: Parker) -> Self {
        Self {
            state: Mutex::new(HeapState {
                entries: BinaryHeap::new(),
                next_generation: 0,
            }),
            wake,
        }
    }

    /// Arms a deadline. Wakes the control thread when this deadline is
    /// earlier than everything already armed.
    pub(crate) fn schedule(&self, deadline: Instant, callback: TimerCallback) {
        let preempts = {
            let mut state = self.state.lock();
            let preempts = state
                .entries
                .peek()
                .is_none_or(|earliest| deadline < earliest.deadline);
            let generation = state.next_generation;
            state.next_generation += 1;
            state.entries.push(TimerEntry {
                deadline,
                generation,
                callback,
            });
            preempts
        };
        if preempts {
            self.wake.unpark();
        }
    }

    /// Earliest armed deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.state.lock().entries.peek().map(|e| e.deadline)
    }

    /// Pops and runs every callback whose deadline is at or before `now`.
    /// Callbacks run outside the lock; a callback may re-arm.
    pub(crate) fn fire_expired(&self, now: Instant) {
        loop {
            let entry = {
                let mut state = self.state.lock();
                match state.entries.peek() {
                    Some(earliest) if earliest.deadline <= now => state.entries.pop(),
                    _ => None,
                }
            };
            match entry {
                Some(entry) => (entry.callback)(),
                None => break,
            }
        }
    }
}

impl std::fmt::Debug for TimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TimerService")
            .field("armed", &state.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fires_in_deadline_order() {
        let timers = TimerService::new(Parker::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let base = Instant::now();
        for (tag, offset_ms) in [(0u32, 30u64), (1, 10), (2, 20)] {
            let order = Arc::clone(&order);
            timers.schedule(
                base + Duration::from_millis(offset_ms),
                Box::new(move || order.lock().push(tag)),
            );
        }

        timers.fire_expired(base + Duration::from_millis(100));
        assert_eq!(*order.lock(), vec![1, 2, 0]);
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn equal_deadlines_fire_in_arming_order() {
        let timers = TimerService::new(Parker::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let deadline = Instant::now() + Duration::from_millis(5);
        for tag in 0..4u32 {
            let order = Arc::clone(&order);
            timers.schedule(deadline, Box::new(move || order.lock().push(tag)));
        }

        timers.fire_expired(deadline);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn unexpired_deadlines_stay_armed() {
        let timers = TimerService::new(Parker::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&fired);
        let now = Instant::now();
        let deadline = now + Duration::from_secs(60);
        timers.schedule(
            deadline,
            Box::new(move || {
                probe.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );

        timers.fire_expired(now);
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(timers.next_deadline(), Some(deadline));
    }

    #[test]
    fn callback_may_rearm() {
        let timers = Arc::new(TimerService::new(Parker::new()));
        let fired = Arc::new(AtomicUsize::new(0));
        let now = Instant::now();

        let rearm = Arc::clone(&timers);
        let probe = Arc::clone(&fired);
        timers.schedule(
            now,
            Box::new(move || {
                probe.fetch_add(1, AtomicOrdering::SeqCst);
                let probe = Arc::clone(&probe);
                rearm.schedule(
                    now + Duration::from_secs(300),
                    Box::new(move || {
                        probe.fetch_add(1, AtomicOrdering::SeqCst);
                    }),
                );
            }),
        );

        timers.fire_expired(now);
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
        assert!(timers.next_deadline().is_some());
    }
}
