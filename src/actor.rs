//! Actor abstraction and the in-actor scheduling API.
//!
//! An actor is a stateful unit of sequential logic. The runtime invokes
//! its work as discrete, non-blocking *job steps*, one at a time, always
//! on the runner thread that currently owns the actor. Actor state is
//! therefore mutated without any synchronization ("single-writer"
//! discipline).
//!
//! # Lifecycle
//!
//! `New → Starting → Started → Closing → Closed`. Submission enqueues the
//! bootstrap job ([`Actor::on_start`]); closing enqueues the teardown job
//! ([`Actor::on_close`]) *behind* already-queued work, and nothing
//! submitted after the close request ever executes. `Closed` is terminal.
//!
//! # Caller obligation
//!
//! Every job step must be non-blocking: bounded CPU, no indefinite waits.
//! A step that blocks starves every other actor on the same runner. The
//! runtime cannot enforce this; it is a documented contract. The only
//! suspension mechanism is registering a continuation on an
//! [`ActorFuture`] via [`ActorCtx::run_on_completion`].
//!
//! # Example
//!
//! ```ignore
//! struct Counter {
//!     count: u64,
//! }
//!
//! impl Actor for Counter {
//!     fn on_start(&mut self, ctx: &ActorCtx<Self>) {
//!         ctx.run_at_fixed_rate(Duration::from_secs(1), |counter, _ctx| {
//!             counter.count += 1;
//!         });
//!     }
//! }
//!
//! let handle = scheduler.submit_actor(Counter { count: 0 });
//! // ... later:
//! handle.close().join(Duration::from_secs(5))??;
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{panic_message, FutureError};
use crate::future::ActorFuture;
use crate::reference::ActorTask;
use crate::runner::Topology;
use crate::timer::TimerService;

/// Stable identity of a submitted actor, for diagnostics and scheduler
/// bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(pub(crate) u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

/// Lifecycle phase of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ActorPhase {
    /// Created, not yet submitted.
    New = 0,
    /// Submitted; the bootstrap job has not finished.
    Starting = 1,
    /// Running arbitrary submitted jobs.
    Started = 2,
    /// Close requested; draining previously enqueued jobs, then teardown.
    Closing = 3,
    /// Terminal. No further jobs are accepted and no resources are held.
    Closed = 4,
}

impl ActorPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::New,
            1 => Self::Starting,
            2 => Self::Started,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A unit of sequential, single-threaded logic scheduled cooperatively by
/// the runtime.
pub trait Actor: Send + Sized + 'static {
    /// Diagnostic name. Defaults to the unqualified type name.
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("actor")
            .to_string()
    }

    /// Bootstrap hook, run as the single `Starting` job.
    fn on_start(&mut self, _ctx: &ActorCtx<Self>) {}

    /// Teardown hook, run as the single `Closing` job after the queue has
    /// drained.
    fn on_close(&mut self, _ctx: &ActorCtx<Self>) {}
}

/// One pending job step.
pub(crate) type Job<A> = Box<dyn FnOnce(&mut A, &ActorCtx<A>) + Send + 'static>;

/// FIFO job queue of one actor. Pushed from any thread, popped only by
/// the owning runner.
pub(crate) struct JobQueue<A> {
    jobs: Mutex<VecDeque<Job<A>>>,
}

impl<A> JobQueue<A> {
    pub(crate) fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, job: Job<A>) {
        self.jobs.lock().push_back(job);
    }

    fn pop(&self) -> Option<Job<A>> {
        self.jobs.lock().pop_front()
    }

    fn has_pending(&self) -> bool {
        !self.jobs.lock().is_empty()
    }
}

/// Cross-thread-visible record of one actor: lifecycle phase, current
/// runner ownership, and the published load snapshot.
///
/// The owner field is swapped only during a reclaim handoff; the mean is
/// published by the owning runner after each batch and read by the
/// scheduler without locking runner internals.
pub(crate) struct ActorShared {
    id: ActorId,
    name: String,
    phase: AtomicU8,
    owner: AtomicUsize,
    mean_nanos: AtomicU64,
    close: Mutex<Option<ActorFuture<()>>>,
}

/// Sentinel owner index before first placement.
pub(crate) const UNOWNED: usize = usize::MAX;

impl ActorShared {
    pub(crate) fn new(id: ActorId, name: String) -> Self {
        Self {
            id,
            name,
            phase: AtomicU8::new(ActorPhase::New as u8),
            owner: AtomicUsize::new(UNOWNED),
            mean_nanos: AtomicU64::new(0),
            close: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> ActorId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn phase(&self) -> ActorPhase {
        ActorPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: ActorPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Advances `from → to`; returns false if another transition won.
    pub(crate) fn advance(&self, from: ActorPhase, to: ActorPhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves the phase to `Closing` unless already closing or closed.
    pub(crate) fn request_close(&self) {
        let mut current = self.phase.load(Ordering::Acquire);
        while current < ActorPhase::Closing as u8 {
            match self.phase.compare_exchange(
                current,
                ActorPhase::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub(crate) fn owner(&self) -> usize {
        self.owner.load(Ordering::Acquire)
    }

    pub(crate) fn set_owner(&self, runner: usize) {
        self.owner.store(runner, Ordering::Release);
    }

    pub(crate) fn mean_nanos(&self) -> u64 {
        self.mean_nanos.load(Ordering::Acquire)
    }

    pub(crate) fn publish_mean(&self, nanos: u64) {
        self.mean_nanos.store(nanos, Ordering::Release);
    }

    pub(crate) fn close_slot(&self) -> &Mutex<Option<ActorFuture<()>>> {
        &self.close
    }
}

/// The in-actor scheduling API, bound to one actor's job queue.
///
/// Cloneable and `Send`: an actor may hand clones of its context to other
/// actors or external threads. Every entry point turns into a job on this
/// actor's FIFO queue, so all of them preserve the single-writer
/// discipline regardless of the calling thread.
pub struct ActorCtx<A> {
    shared: Arc<ActorShared>,
    queue: Arc<JobQueue<A>>,
    timers: Arc<TimerService>,
    topology: Arc<Topology>,
}

impl<A> Clone for ActorCtx<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            queue: Arc::clone(&self.queue),
            timers: Arc::clone(&self.timers),
            topology: Arc::clone(&self.topology),
        }
    }
}

impl<A> fmt::Debug for ActorCtx<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCtx")
            .field("id", &self.shared.id())
            .field("name", &self.shared.name())
            .field("phase", &self.shared.phase())
            .finish()
    }
}

impl<A: Actor> ActorCtx<A> {
    pub(crate) fn new(
        shared: Arc<ActorShared>,
        queue: Arc<JobQueue<A>>,
        timers: Arc<TimerService>,
        topology: Arc<Topology>,
    ) -> Self {
        Self {
            shared,
            queue,
            timers,
            topology,
        }
    }

    /// Identity of this actor.
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.shared.id()
    }

    /// Diagnostic name of this actor.
    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> ActorPhase {
        self.shared.phase()
    }

    /// Enqueues a job step on this actor.
    ///
    /// Silently dropped once the actor is closing or closed: no job
    /// submitted after a close request is ever executed.
    pub fn run<F>(&self, job: F)
    where
        F: FnOnce(&mut A, &ActorCtx<A>) + Send + 'static,
    {
        let _ = self.enqueue(Box::new(job), false);
    }

    /// Enqueues a job step producing a value; the returned future
    /// completes with it.
    ///
    /// If the actor is closing, or the step panics, the future completes
    /// exceptionally instead.
    pub fn call<T, F>(&self, job: F) -> ActorFuture<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&mut A, &ActorCtx<A>) -> T + Send + 'static,
    {
        let future = ActorFuture::new();
        let completion = future.clone();
        let accepted = self.enqueue(
            Box::new(move |actor, ctx| {
                match catch_unwind(AssertUnwindSafe(|| job(actor, ctx))) {
                    Ok(value) => {
                        let _ = completion.complete(value);
                    }
                    Err(payload) => {
                        let _ = completion.complete_exceptionally(FutureError::new(
                            panic_message(payload.as_ref()),
                        ));
                    }
                }
            }),
            false,
        );
        if !accepted {
            let _ = future.complete_exceptionally(FutureError::new(format!(
                "{} is not running",
                self.shared.id()
            )));
        }
        future
    }

    /// Registers a continuation on `future`, delivered as a job on *this*
    /// actor once the future resolves. If it already has, the job is
    /// enqueued immediately.
    pub fn run_on_completion<T, F>(&self, future: &ActorFuture<T>, callback: F)
    where
        T: Clone + Send + 'static,
        F: FnOnce(&mut A, &ActorCtx<A>, Result<T, FutureError>) + Send + 'static,
    {
        let ctx = self.clone();
        future.on_resolution(Box::new(move |outcome| {
            ctx.run(move |actor, ctx| callback(actor, ctx, outcome));
        }));
    }

    /// Enqueues a job step after `delay`.
    ///
    /// Dropped, like any submission, if the actor is closing by the time
    /// the timer fires.
    pub fn run_delayed<F>(&self, delay: Duration, job: F)
    where
        F: FnOnce(&mut A, &ActorCtx<A>) + Send + 'static,
    {
        if self.shared.phase() >= ActorPhase::Closing {
            return;
        }
        let ctx = self.clone();
        self.timers.schedule(
            Instant::now() + delay,
            Box::new(move || ctx.run(job)),
        );
    }

    /// Enqueues a job step every `period`, starting one period from now.
    ///
    /// Stops re-arming once the actor starts closing.
    pub fn run_at_fixed_rate<F>(&self, period: Duration, job: F)
    where
        F: Fn(&mut A, &ActorCtx<A>) + Send + Sync + 'static,
    {
        self.schedule_fixed_rate(period, Arc::new(job));
    }

    fn schedule_fixed_rate(&self, period: Duration, job: Arc<dyn Fn(&mut A, &ActorCtx<A>) + Send + Sync>) {
        if self.shared.phase() >= ActorPhase::Closing {
            return;
        }
        let ctx = self.clone();
        self.timers.schedule(
            Instant::now() + period,
            Box::new(move || {
                let step = Arc::clone(&job);
                ctx.run(move |actor, inner| step(actor, inner));
                ctx.schedule_fixed_rate(period, job);
            }),
        );
    }

    /// Enqueues the bootstrap job. Called once at submission.
    pub(crate) fn enqueue_startup(&self) {
        let _ = self.enqueue(
            Box::new(|actor, ctx| {
                actor.on_start(ctx);
                // A close request may have raced in during on_start.
                let _ = ctx.shared.advance(ActorPhase::Starting, ActorPhase::Started);
            }),
            true,
        );
    }

    /// Enqueues the teardown job behind all currently queued work.
    pub(crate) fn enqueue_teardown(&self) {
        let _ = self.enqueue(
            Box::new(|actor, ctx| {
                actor.on_close(ctx);
                ctx.shared.set_phase(ActorPhase::Closed);
                let close = ctx.shared.close_slot().lock().clone();
                if let Some(future) = close {
                    let _ = future.complete(());
                }
                tracing::debug!(actor = %ctx.shared.id(), name = %ctx.shared.name(), "actor closed");
            }),
            true,
        );
    }

    fn enqueue(&self, job: Job<A>, lifecycle_job: bool) -> bool {
        if !lifecycle_job && self.shared.phase() >= ActorPhase::Closing {
            tracing::trace!(
                actor = %self.shared.id(),
                "dropping job submitted after close request"
            );
            return false;
        }
        self.queue.push(job);
        self.wake_owner();
        true
    }

    fn wake_owner(&self) {
        // A stale owner read during migration only costs a spurious
        // unpark; the handoff unparks the new owner itself.
        let owner = self.shared.owner();
        if let Some(runner) = self.topology.runners.get(owner) {
            runner.parker.unpark();
        }
    }
}

/// An actor plus its context, type-erased behind [`ActorTask`] so runners
/// can own a heterogeneous collection.
pub(crate) struct ActorCell<A: Actor> {
    pub(crate) actor: A,
    pub(crate) ctx: ActorCtx<A>,
}

impl<A: Actor> ActorTask for ActorCell<A> {
    fn shared(&self) -> &Arc<ActorShared> {
        &self.ctx.shared
    }

    fn has_pending(&self) -> bool {
        self.ctx.queue.has_pending()
    }

    fn execute_next(&mut self) {
        if let Some(job) = self.ctx.queue.pop() {
            job(&mut self.actor, &self.ctx);
        }
    }
}

/// Type-erased handle to a submitted actor.
///
/// Usable from any thread to observe the lifecycle and request closure.
#[derive(Clone)]
pub struct ActorHandle {
    shared: Arc<ActorShared>,
    closer: Arc<dyn Fn() + Send + Sync>,
}

impl ActorHandle {
    pub(crate) fn new(shared: Arc<ActorShared>, closer: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self { shared, closer }
    }

    /// Identity of the actor.
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.shared.id()
    }

    /// Diagnostic name of the actor.
    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> ActorPhase {
        self.shared.phase()
    }

    /// Returns true once the actor reached its terminal phase.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.phase() == ActorPhase::Closed
    }

    /// Requests closure.
    ///
    /// Flips the phase to `Closing` immediately (later submissions are
    /// rejected), enqueues the teardown job behind already-queued work,
    /// and returns a future resolving once the actor is `Closed`.
    /// Idempotent: every call returns the same future.
    pub fn close(&self) -> ActorFuture<()> {
        let future = {
            let mut slot = self.shared.close_slot().lock();
            if let Some(existing) = slot.as_ref() {
                return existing.clone();
            }
            let future = ActorFuture::new();
            *slot = Some(future.clone());
            future
        };
        self.shared.request_close();
        (self.closer)();
        tracing::debug!(actor = %self.shared.id(), name = %self.shared.name(), "actor close requested");
        future
    }
}

impl fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("id", &self.shared.id())
            .field("name", &self.shared.name())
            .field("phase", &self.shared.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_ordering_matches_lifecycle() {
        assert!(ActorPhase::New < ActorPhase::Starting);
        assert!(ActorPhase::Starting < ActorPhase::Started);
        assert!(ActorPhase::Started < ActorPhase::Closing);
        assert!(ActorPhase::Closing < ActorPhase::Closed);
    }

    #[test]
    fn request_close_is_monotonic() {
        let shared = ActorShared::new(ActorId(1), "test".to_string());
        shared.set_phase(ActorPhase::Started);
        shared.request_close();
        assert_eq!(shared.phase(), ActorPhase::Closing);

        // Idempotent, and never regresses from Closed.
        shared.set_phase(ActorPhase::Closed);
        shared.request_close();
        assert_eq!(shared.phase(), ActorPhase::Closed);
    }

    #[test]
    fn advance_requires_expected_phase() {
        let shared = ActorShared::new(ActorId(2), "test".to_string());
        assert!(shared.advance(ActorPhase::New, ActorPhase::Starting));
        assert!(!shared.advance(ActorPhase::New, ActorPhase::Starting));
        assert_eq!(shared.phase(), ActorPhase::Starting);
    }

    struct Named;
    impl Actor for Named {}

    #[test]
    fn default_name_is_unqualified_type_name() {
        assert_eq!(Named.name(), "Named");
    }

    struct Inert;
    impl Actor for Inert {}

    #[test]
    fn jobs_landing_behind_teardown_never_execute() {
        use crate::error::logging_error_handler;
        use crate::idle::Parker;
        use crate::reference::ActorRef;
        use std::sync::atomic::AtomicBool;

        let shared = Arc::new(ActorShared::new(ActorId(7), "raced".to_string()));
        let queue = Arc::new(JobQueue::new());
        let ctx = ActorCtx::<Inert>::new(
            Arc::clone(&shared),
            Arc::clone(&queue),
            Arc::new(TimerService::new(Parker::new())),
            Arc::new(Topology::new(1)),
        );
        shared.set_phase(ActorPhase::Starting);
        ctx.enqueue_startup();

        let cell = ActorCell {
            actor: Inert,
            ctx: ctx.clone(),
        };
        let mut actor_ref = ActorRef::new(Box::new(cell), 8);
        let handler = logging_error_handler();
        assert!(actor_ref.execute_batch(16, &handler));
        assert_eq!(shared.phase(), ActorPhase::Started);

        shared.request_close();
        ctx.enqueue_teardown();
        // A submission that read the phase just before the close request
        // still lands in the queue, behind the teardown job.
        let executed = Arc::new(AtomicBool::new(false));
        let witness = Arc::clone(&executed);
        queue.push(Box::new(move |_, _| witness.store(true, Ordering::SeqCst)));

        assert!(actor_ref.execute_batch(16, &handler));
        assert_eq!(shared.phase(), ActorPhase::Closed);
        assert!(
            !executed.load(Ordering::SeqCst),
            "job behind the teardown ran on a closed actor"
        );
    }
}
