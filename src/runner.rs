//! Runner (worker thread) loop.
//!
//! Each runner owns a dynamic set of actor references and drives them in
//! round-robin order: SCAN the collection, EXECUTE up to the configured
//! iteration budget per actor, SAMPLE the batch duration, then either
//! repeat or apply the idle strategy.
//!
//! Cross-thread mutation is limited to two queues on [`RunnerShared`]:
//! newly placed or migrated references arrive through `incoming`, and the
//! scheduler's migration decisions arrive through `reclaims`. Both are
//! serviced at the top of a pass, structurally between batches, so no
//! job of a moved actor is ever in flight at the moment its reference
//! changes hands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;

use crate::actor::{ActorId, ActorPhase};
use crate::config::SchedulerConfig;
use crate::idle::{IdleStrategy, Parker};
use crate::reference::ActorRef;

/// The fixed set of runners; shared with every actor context so a
/// cross-thread enqueue can unpark the owning runner.
pub(crate) struct Topology {
    pub(crate) runners: Vec<Arc<RunnerShared>>,
}

impl Topology {
    pub(crate) fn new(thread_count: usize) -> Self {
        Self {
            runners: (0..thread_count)
                .map(|id| Arc::new(RunnerShared::new(id)))
                .collect(),
        }
    }
}

/// A scheduler-issued request to move one actor to another runner.
pub(crate) struct ReclaimRequest {
    pub(crate) actor: ActorId,
    pub(crate) target: Arc<RunnerShared>,
}

/// Cross-thread surface of one runner.
pub(crate) struct RunnerShared {
    pub(crate) id: usize,
    pub(crate) parker: Parker,
    /// References handed to this runner (placement and migration).
    pub(crate) incoming: SegQueue<ActorRef>,
    /// Pending migration requests for actors this runner owns.
    pub(crate) reclaims: SegQueue<ReclaimRequest>,
}

impl RunnerShared {
    fn new(id: usize) -> Self {
        Self {
            id,
            parker: Parker::new(),
            incoming: SegQueue::new(),
            reclaims: SegQueue::new(),
        }
    }
}

/// One worker thread's state: the owned reference collection plus the
/// loop configuration.
pub(crate) struct Runner {
    shared: Arc<RunnerShared>,
    refs: Vec<ActorRef>,
    iterations_per_actor: u32,
    error_handler: crate::error::RunnerErrorHandler,
    idle_strategy: Arc<dyn IdleStrategy>,
    idle_passes: u32,
    shutdown: Arc<AtomicBool>,
}

impl Runner {
    pub(crate) fn new(
        shared: Arc<RunnerShared>,
        config: &SchedulerConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            shared,
            refs: Vec::new(),
            iterations_per_actor: config.base_iterations_per_actor(),
            error_handler: config.runner_error_handler().clone(),
            idle_strategy: Arc::clone(config.runner_idle_strategy()),
            idle_passes: 0,
            shutdown,
        }
    }

    /// The worker thread body.
    pub(crate) fn run_loop(&mut self) {
        tracing::debug!(runner = self.shared.id, "runner started");
        while !self.shutdown.load(Ordering::Acquire) {
            if self.run_once() {
                self.idle_passes = 0;
            } else {
                self.idle_passes = self.idle_passes.saturating_add(1);
                self.idle_strategy.idle(self.idle_passes, &self.shared.parker);
            }
        }
        tracing::debug!(
            runner = self.shared.id,
            actors = self.refs.len(),
            "runner stopped"
        );
    }

    /// One full pass: absorb handoffs, service reclaims, execute a batch
    /// per actor with pending work, prune closed actors. Returns true if
    /// any job step ran.
    pub(crate) fn run_once(&mut self) -> bool {
        self.absorb_incoming();
        self.service_reclaims();

        let mut did_work = false;
        for actor_ref in &mut self.refs {
            if actor_ref.execute_batch(self.iterations_per_actor, &self.error_handler) {
                did_work = true;
            }
        }

        self.prune_closed();
        did_work
    }

    /// Number of currently owned references.
    #[cfg(test)]
    pub(crate) fn actor_count(&self) -> usize {
        self.refs.len()
    }

    fn absorb_incoming(&mut self) {
        while let Some(actor_ref) = self.shared.incoming.pop() {
            tracing::trace!(
                runner = self.shared.id,
                actor = %actor_ref.shared().id(),
                "reference absorbed"
            );
            self.refs.push(actor_ref);
        }
    }

    fn service_reclaims(&mut self) {
        while let Some(request) = self.shared.reclaims.pop() {
            let Some(position) = self
                .refs
                .iter()
                .position(|r| r.shared().id() == request.actor)
            else {
                // Already closed or previously migrated; best effort.
                tracing::trace!(
                    runner = self.shared.id,
                    actor = %request.actor,
                    "reclaim request for unowned actor ignored"
                );
                continue;
            };
            let actor_ref = self.refs.swap_remove(position);
            actor_ref.shared().set_owner(request.target.id);
            tracing::debug!(
                actor = %request.actor,
                from = self.shared.id,
                to = request.target.id,
                "actor migrated"
            );
            request.target.incoming.push(actor_ref);
            request.target.parker.unpark();
        }
    }

    fn prune_closed(&mut self) {
        self.refs.retain(|actor_ref| {
            let closed = actor_ref.shared().phase() == ActorPhase::Closed;
            if closed {
                tracing::trace!(
                    runner = self.shared.id,
                    actor = %actor_ref.shared().id(),
                    "closed actor removed from runner"
                );
            }
            !closed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorCell, ActorCtx, ActorShared, JobQueue};
    use crate::config::SchedulerConfig;
    use crate::idle::Parker;
    use crate::reference::ActorRef;
    use crate::timer::TimerService;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct Recorder {
        executed: Arc<AtomicUsize>,
    }

    impl Actor for Recorder {}

    struct Fixture {
        topology: Arc<Topology>,
        config: SchedulerConfig,
        shutdown: Arc<AtomicBool>,
        timers: Arc<TimerService>,
        next_id: u64,
    }

    impl Fixture {
        fn new(thread_count: usize) -> Self {
            Self {
                topology: Arc::new(Topology::new(thread_count)),
                config: SchedulerConfig::builder()
                    .thread_count(thread_count)
                    .build()
                    .expect("test config"),
                shutdown: Arc::new(AtomicBool::new(false)),
                timers: Arc::new(TimerService::new(Parker::new())),
                next_id: 0,
            }
        }

        fn runner(&self, index: usize) -> Runner {
            Runner::new(
                Arc::clone(&self.topology.runners[index]),
                &self.config,
                Arc::clone(&self.shutdown),
            )
        }

        /// Builds a recorder actor reference placed on the given runner.
        fn place_recorder(
            &mut self,
            runner: usize,
        ) -> (Arc<ActorShared>, ActorCtx<Recorder>, Arc<AtomicUsize>) {
            self.next_id += 1;
            let executed = Arc::new(AtomicUsize::new(0));
            let shared = Arc::new(ActorShared::new(
                ActorId(self.next_id),
                "recorder".to_string(),
            ));
            let queue = Arc::new(JobQueue::new());
            let ctx = ActorCtx::new(
                Arc::clone(&shared),
                queue,
                Arc::clone(&self.timers),
                Arc::clone(&self.topology),
            );
            shared.set_phase(ActorPhase::Starting);
            ctx.enqueue_startup();
            shared.set_owner(runner);
            let cell = ActorCell {
                actor: Recorder {
                    executed: Arc::clone(&executed),
                },
                ctx: ctx.clone(),
            };
            let actor_ref = ActorRef::new(Box::new(cell), 8);
            self.topology.runners[runner].incoming.push(actor_ref);
            (shared, ctx, executed)
        }
    }

    #[test]
    fn pass_executes_pending_jobs_fifo() {
        let mut fixture = Fixture::new(1);
        let (_, ctx, _) = fixture.place_recorder(0);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for tag in 0..3u32 {
            let order = Arc::clone(&order);
            ctx.run(move |_, _| order.lock().push(tag));
        }

        let mut runner = fixture.runner(0);
        assert!(runner.run_once());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(!runner.run_once(), "drained runner reports no work");
    }

    #[test]
    fn step_panic_reaches_handler_and_later_jobs_still_run() {
        let failures = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&failures);
        let config = SchedulerConfig::builder()
            .thread_count(1)
            .runner_error_handler(Arc::new(move |_failure| {
                observed.fetch_add(1, Ordering::SeqCst);
            }) as crate::error::RunnerErrorHandler)
            .build()
            .expect("test config");

        let mut fixture = Fixture::new(1);
        fixture.config = config;
        let (_, ctx, _) = fixture.place_recorder(0);
        let ran_after = Arc::new(AtomicUsize::new(0));
        let witness = Arc::clone(&ran_after);
        ctx.run(|_, _| panic!("injected step failure"));
        ctx.run(move |_, _| {
            witness.fetch_add(1, Ordering::SeqCst);
        });

        let mut runner = fixture.runner(0);
        assert!(runner.run_once());
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(ran_after.load(Ordering::SeqCst), 1);
        assert_eq!(runner.actor_count(), 1, "panic never closes the actor");
    }

    #[test]
    fn reclaim_hands_reference_to_target_with_queue_intact() {
        let mut fixture = Fixture::new(2);
        let (shared, ctx, executed) = fixture.place_recorder(0);
        let mut source = fixture.runner(0);
        let mut target = fixture.runner(1);

        // Drain the startup job, then queue a job and migrate before it runs.
        source.run_once();
        ctx.run(|actor, _| {
            actor.executed.fetch_add(1, Ordering::SeqCst);
        });
        fixture.topology.runners[0].reclaims.push(ReclaimRequest {
            actor: shared.id(),
            target: Arc::clone(&fixture.topology.runners[1]),
        });

        // Source services the reclaim at the top of its pass; the queued
        // job must not run there.
        source.run_once();
        assert_eq!(source.actor_count(), 0);
        assert_eq!(shared.owner(), 1);
        assert_eq!(executed.load(Ordering::SeqCst), 0);

        assert!(target.run_once());
        assert_eq!(target.actor_count(), 1);
        assert_eq!(executed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reclaim_for_unknown_actor_is_ignored() {
        let fixture = Fixture::new(2);
        let mut source = fixture.runner(0);
        fixture.topology.runners[0].reclaims.push(ReclaimRequest {
            actor: ActorId(404),
            target: Arc::clone(&fixture.topology.runners[1]),
        });
        assert!(!source.run_once());
        assert_eq!(source.actor_count(), 0);
    }

    #[test]
    fn closed_actor_is_pruned_after_teardown() {
        let mut fixture = Fixture::new(1);
        let (shared, ctx, _) = fixture.place_recorder(0);
        let mut runner = fixture.runner(0);
        runner.run_once();
        assert_eq!(runner.actor_count(), 1);

        shared.request_close();
        ctx.enqueue_teardown();
        runner.run_once();
        assert_eq!(shared.phase(), ActorPhase::Closed);
        assert_eq!(runner.actor_count(), 0);
    }

    #[test]
    fn iteration_budget_bounds_a_batch() {
        let mut fixture = Fixture::new(1);
        fixture.config = SchedulerConfig::builder()
            .thread_count(1)
            .base_iterations_per_actor(2)
            .build()
            .expect("test config");
        let (_, ctx, executed) = fixture.place_recorder(0);
        for _ in 0..5 {
            ctx.run(|actor, _| {
                actor.executed.fetch_add(1, Ordering::SeqCst);
            });
        }

        let mut runner = fixture.runner(0);
        // Pass 1 runs the startup job plus one user job (budget 2).
        runner.run_once();
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        runner.run_once();
        assert_eq!(executed.load(Ordering::SeqCst), 3);
        runner.run_once();
        assert_eq!(executed.load(Ordering::SeqCst), 5);
    }
}
