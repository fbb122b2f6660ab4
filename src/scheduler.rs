//! Scheduler assembly and control thread.
//!
//! [`ActorScheduler`] owns the runner threads plus one control thread.
//! The control thread fires expired timers and periodically rebalances
//! actors across runners from their published mean batch durations.
//!
//! Rebalance cadence adapts to effectiveness: after an enacted migration
//! the next pass runs one sample period later and the backoff resets;
//! after a pass that planned nothing the wait grows, doubling up to the
//! configured maximum, so a settled system stops paying for snapshots.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;

use crate::actor::{
    Actor, ActorCell, ActorCtx, ActorHandle, ActorId, ActorPhase, ActorShared, JobQueue,
};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::future::ActorFuture;
use crate::idle::Parker;
use crate::rebalance::{plan_migration, ActorLoad, RunnerLoad};
use crate::reference::ActorRef;
use crate::runner::{ReclaimRequest, Runner, Topology};
use crate::timer::TimerService;

/// State shared between the public handle, the control thread, and actor
/// contexts.
struct SchedulerInner {
    config: SchedulerConfig,
    topology: Arc<Topology>,
    timers: Arc<TimerService>,
    /// Live actors, for placement counts and load snapshots. Closed
    /// entries are pruned lazily.
    registry: Mutex<Registry>,
    next_actor_id: AtomicU64,
    control_parker: Parker,
    shutdown: Arc<AtomicBool>,
}

struct Registry {
    actors: Vec<Arc<ActorShared>>,
    /// Round-robin cursor for tie-breaking placement.
    placement_cursor: usize,
}

impl SchedulerInner {
    fn submit<A: Actor>(&self, actor: A) -> ActorHandle {
        let id = ActorId(self.next_actor_id.fetch_add(1, Ordering::Relaxed));
        let name = actor.name();
        let shared = Arc::new(ActorShared::new(id, name));
        let queue = Arc::new(JobQueue::new());
        let ctx = ActorCtx::new(
            Arc::clone(&shared),
            queue,
            Arc::clone(&self.timers),
            Arc::clone(&self.topology),
        );

        shared.set_phase(ActorPhase::Starting);
        ctx.enqueue_startup();

        let runner = {
            let mut registry = self.registry.lock();
            registry.actors.retain(|a| a.phase() != ActorPhase::Closed);
            let mut counts = vec![0_usize; self.topology.runners.len()];
            for live in &registry.actors {
                if let Some(count) = counts.get_mut(live.owner()) {
                    *count += 1;
                }
            }
            let chosen = pick_runner(&counts, registry.placement_cursor);
            registry.placement_cursor = chosen + 1;
            // The owner must be set before the record becomes visible,
            // or a concurrent submission would count this actor as
            // unowned and under-count the chosen runner.
            shared.set_owner(chosen);
            registry.actors.push(Arc::clone(&shared));
            chosen
        };

        let teardown_ctx = ctx.clone();
        let handle = ActorHandle::new(
            Arc::clone(&shared),
            Arc::new(move || teardown_ctx.enqueue_teardown()),
        );

        let cell = ActorCell { actor, ctx };
        let actor_ref = ActorRef::new(Box::new(cell), self.config.duration_sample_count());
        self.topology.runners[runner].incoming.push(actor_ref);
        self.topology.runners[runner].parker.unpark();
        tracing::debug!(actor = %id, name = %handle.name(), runner, "actor submitted");
        handle
    }

    /// Takes one load snapshot and, when warranted, issues one migration
    /// request. Returns whether a migration was issued.
    fn rebalance_once(&self) -> bool {
        let mut loads: Vec<RunnerLoad> = (0..self.topology.runners.len())
            .map(|runner| RunnerLoad {
                runner,
                actors: Vec::new(),
            })
            .collect();
        {
            let mut registry = self.registry.lock();
            registry.actors.retain(|a| a.phase() != ActorPhase::Closed);
            for shared in &registry.actors {
                if let Some(load) = loads.get_mut(shared.owner()) {
                    load.actors.push(ActorLoad {
                        actor: shared.id(),
                        mean_nanos: shared.mean_nanos(),
                    });
                }
            }
        }

        let Some(migration) = plan_migration(&loads, self.config.imbalance_threshold()) else {
            return false;
        };
        let source = &self.topology.runners[migration.from];
        source.reclaims.push(ReclaimRequest {
            actor: migration.actor,
            target: Arc::clone(&self.topology.runners[migration.to]),
        });
        source.parker.unpark();
        tracing::debug!(
            actor = %migration.actor,
            from = migration.from,
            to = migration.to,
            "migration requested"
        );
        true
    }

    fn control_loop(&self) {
        tracing::debug!("scheduler control thread started");
        let period = self.config.duration_sample_period();
        let mut backoff = self.config.scheduler_initial_backoff();
        let mut next_rebalance = Instant::now() + period;

        while !self.shutdown.load(Ordering::Acquire) {
            let now = Instant::now();
            self.timers.fire_expired(now);

            if now >= next_rebalance {
                if self.rebalance_once() {
                    backoff = self.config.scheduler_initial_backoff();
                    next_rebalance = now + period;
                } else {
                    next_rebalance = now + period.max(backoff);
                    backoff = backoff
                        .saturating_mul(2)
                        .min(self.config.scheduler_max_backoff());
                }
            }

            let mut wake_at = next_rebalance;
            if let Some(deadline) = self.timers.next_deadline() {
                wake_at = wake_at.min(deadline);
            }
            let now = Instant::now();
            if wake_at > now {
                self.control_parker.park_timeout(wake_at - now);
            }
        }
        tracing::debug!("scheduler control thread stopped");
    }
}

/// Picks the runner with the fewest live actors, scanning from `cursor`
/// so that equal counts rotate instead of piling onto runner zero.
fn pick_runner(counts: &[usize], cursor: usize) -> usize {
    let len = counts.len();
    let mut best = cursor % len;
    for offset in 1..len {
        let candidate = (cursor + offset) % len;
        if counts[candidate] < counts[best] {
            best = candidate;
        }
    }
    best
}

/// The runtime: a fixed pool of runner threads plus a control thread.
///
/// Dropping the scheduler without calling [`ActorScheduler::shutdown`]
/// leaves the threads running detached; orderly teardown is explicit.
pub struct ActorScheduler {
    inner: Arc<SchedulerInner>,
    threads: Vec<JoinHandle<()>>,
}

impl ActorScheduler {
    /// Builds the topology and spawns all threads.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let topology = Arc::new(Topology::new(config.thread_count()));
        let control_parker = Parker::new();
        let timers = Arc::new(TimerService::new(control_parker.clone()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let inner = Arc::new(SchedulerInner {
            config,
            topology: Arc::clone(&topology),
            timers,
            registry: Mutex::new(Registry {
                actors: Vec::new(),
                placement_cursor: 0,
            }),
            next_actor_id: AtomicU64::new(1),
            control_parker,
            shutdown: Arc::clone(&shutdown),
        });

        let mut threads = Vec::with_capacity(topology.runners.len() + 1);
        let spawn_result: Result<(), std::io::Error> = (|| {
            for shared in &topology.runners {
                let mut runner =
                    Runner::new(Arc::clone(shared), &inner.config, Arc::clone(&shutdown));
                let handle = std::thread::Builder::new()
                    .name(format!("strand-runner-{}", shared.id))
                    .spawn(move || runner.run_loop())?;
                threads.push(handle);
            }
            let control = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name("strand-scheduler".to_string())
                .spawn(move || control.control_loop())?;
            threads.push(handle);
            Ok(())
        })();

        if let Err(error) = spawn_result {
            // Partial spawn: stop what did start before reporting.
            shutdown.store(true, Ordering::Release);
            for runner in &topology.runners {
                runner.parker.unpark();
            }
            inner.control_parker.unpark();
            for handle in threads {
                if handle.join().is_err() {
                    tracing::error!("thread panicked during aborted startup");
                }
            }
            return Err(SchedulerError::ThreadSpawn(error));
        }

        tracing::info!(
            threads = inner.config.thread_count(),
            "actor scheduler started"
        );
        Ok(Self { inner, threads })
    }

    /// Submits an actor, placing it on the least-loaded runner. The
    /// startup job runs before anything submitted through the handle.
    pub fn submit_actor<A: Actor>(&self, actor: A) -> ActorHandle {
        self.inner.submit(actor)
    }

    /// Requests closure of an actor; equivalent to `handle.close()`.
    pub fn close_actor(&self, handle: &ActorHandle) -> ActorFuture<()> {
        handle.close()
    }

    /// Stops all threads and joins them. Actors that were not closed are
    /// abandoned in place; their queued jobs never run.
    pub fn shutdown(self) {
        self.inner.shutdown.store(true, Ordering::Release);
        for runner in &self.inner.topology.runners {
            runner.parker.unpark();
        }
        self.inner.control_parker.unpark();
        for handle in self.threads {
            if handle.join().is_err() {
                tracing::error!("scheduler thread panicked before join");
            }
        }
        tracing::info!("actor scheduler stopped");
    }
}

impl std::fmt::Debug for ActorScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorScheduler")
            .field("threads", &self.threads.len())
            .finish()
    }
}
