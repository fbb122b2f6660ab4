//! One-shot completion futures with job-scheduled continuations.
//!
//! [`ActorFuture`] is the only suspension primitive of the runtime: an
//! actor that needs a result produced elsewhere registers a continuation
//! (via [`ActorCtx::run_on_completion`](crate::actor::ActorCtx::run_on_completion))
//! and returns from its current step. Continuations are *always* delivered
//! as jobs on the registering actor's queue, never invoked inline on the
//! completing thread, even when the future is already resolved. That is
//! what preserves the single-writer discipline for actor state.
//!
//! # Resolution
//!
//! A future resolves at most once: the first [`complete`](ActorFuture::complete)
//! or [`complete_exceptionally`](ActorFuture::complete_exceptionally) wins,
//! later calls are no-ops and never re-invoke continuations. Result values
//! are `Clone` so every registered continuation observes the outcome.

use std::mem;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

use crate::error::{FutureError, JoinTimeout};

/// Callback invoked with the resolved outcome. Continuation callbacks are
/// wrappers that enqueue a job on their registering actor; they must not
/// run user logic inline.
pub(crate) type Continuation<T> = Box<dyn FnOnce(Result<T, FutureError>) + Send>;

enum State<T> {
    Pending(Vec<Continuation<T>>),
    Resolved(Result<T, FutureError>),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    resolved: Condvar,
}

/// A composable one-shot completion primitive.
///
/// Cheap to clone; all clones observe the same resolution.
#[must_use]
pub struct ActorFuture<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ActorFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ActorFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ActorFuture<T> {
    /// Creates a pending future.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending(Vec::new())),
                resolved: Condvar::new(),
            }),
        }
    }

    /// Returns true once the future has resolved (successfully or not).
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.inner.state.lock(), State::Resolved(_))
    }

    /// Returns true if the future resolved exceptionally.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(&*self.inner.state.lock(), State::Resolved(Err(_)))
    }
}

impl<T: Clone + Send + 'static> ActorFuture<T> {
    /// Creates an already-completed future.
    pub fn completed(value: T) -> Self {
        let future = Self::new();
        let _ = future.complete(value);
        future
    }

    /// Creates an already-failed future.
    pub fn failed(error: FutureError) -> Self {
        let future = Self::new();
        let _ = future.complete_exceptionally(error);
        future
    }

    /// Resolves the future successfully.
    ///
    /// Returns false if the future was already resolved; the value is then
    /// dropped and no continuation runs again.
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolves the future exceptionally.
    ///
    /// Returns false if the future was already resolved.
    pub fn complete_exceptionally(&self, error: FutureError) -> bool {
        self.resolve(Err(error))
    }

    /// Returns a copy of the outcome if resolved.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<T, FutureError>> {
        match &*self.inner.state.lock() {
            State::Resolved(outcome) => Some(outcome.clone()),
            State::Pending(_) => None,
        }
    }

    /// Blocks the calling thread until the future resolves or the timeout
    /// elapses.
    ///
    /// For threads *outside* the scheduler (tests, external callers).
    /// Calling this from inside an actor step would stall the runner and
    /// starve every actor it owns; register a continuation instead.
    pub fn join(&self, timeout: Duration) -> Result<Result<T, FutureError>, JoinTimeout> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if let State::Resolved(outcome) = &*state {
                return Ok(outcome.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(JoinTimeout);
            }
            let timed_out = self
                .inner
                .resolved
                .wait_for(&mut state, deadline - now)
                .timed_out();
            if timed_out {
                if let State::Resolved(outcome) = &*state {
                    return Ok(outcome.clone());
                }
                return Err(JoinTimeout);
            }
        }
    }

    /// Registers a raw continuation.
    ///
    /// Invoked exactly once with the outcome: on the completing thread at
    /// resolution time, or immediately on the registering thread when the
    /// future is already resolved. Callers wrap the callback so that it
    /// only enqueues a job.
    pub(crate) fn on_resolution(&self, continuation: Continuation<T>) {
        let immediate = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending(continuations) => {
                    continuations.push(continuation);
                    None
                }
                State::Resolved(outcome) => Some((continuation, outcome.clone())),
            }
        };
        if let Some((continuation, outcome)) = immediate {
            continuation(outcome);
        }
    }

    fn resolve(&self, outcome: Result<T, FutureError>) -> bool {
        let continuations = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Resolved(_) => return false,
                State::Pending(continuations) => {
                    let continuations = mem::take(continuations);
                    *state = State::Resolved(outcome.clone());
                    continuations
                }
            }
        };
        self.inner.resolved.notify_all();
        for continuation in continuations {
            continuation(outcome.clone());
        }
        true
    }
}
