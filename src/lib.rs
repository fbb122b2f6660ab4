//! Strand: a cooperative actor scheduling runtime.
//!
//! # Overview
//!
//! Strand multiplexes many actors onto a small fixed pool of worker
//! threads. Each actor owns a FIFO queue of jobs (closures over the actor
//! state) and is driven by exactly one runner at a time, so actor state
//! needs no internal locking. Scheduling is cooperative: jobs run to
//! completion and long batches are bounded by an iteration budget, never
//! preempted.
//!
//! # Core Guarantees
//!
//! - **Single-writer actors**: At most one thread executes a given actor's jobs at any moment
//! - **FIFO per actor**: Jobs run in submission order; the startup job runs first, teardown last
//! - **Asynchronous futures**: Continuations are delivered as jobs on the registering actor, never inline on the completer's thread
//! - **Close is a fence**: After a close request, new submissions are dropped; already-queued work drains before teardown
//! - **Adaptive balance**: A control thread migrates actors between runners when measured load diverges
//!
//! # Module Structure
//!
//! - [`actor`]: Actor trait, lifecycle, context, and handles
//! - [`future`]: One-shot completable futures with actor-bound continuations
//! - [`scheduler`]: Thread pool assembly, placement, and rebalancing control
//! - [`config`]: Validated scheduler configuration
//! - [`idle`]: Parking and backoff idle strategies for runner threads
//! - [`error`]: Error types and the runner step-failure handler
//! - [`test_utils`]: Logging setup and assertion macros for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]

pub mod actor;
pub mod config;
pub mod error;
pub mod future;
pub mod idle;
mod rebalance;
mod reference;
mod runner;
pub mod scheduler;
pub mod test_utils;
mod timer;

pub use actor::{Actor, ActorCtx, ActorHandle, ActorId, ActorPhase};
pub use config::{ConfigError, IsoDuration, SchedulerConfig, SchedulerConfigBuilder};
pub use error::{
    logging_error_handler, FutureError, JoinTimeout, RunnerErrorHandler, SchedulerError,
    StepFailure,
};
pub use future::ActorFuture;
pub use idle::{BackoffIdleStrategy, IdleStrategy, Parker};
pub use scheduler::ActorScheduler;
