//! Error types and error handling strategy.
//!
//! Errors in this runtime fall into three tiers:
//!
//! - **Configuration errors** ([`ConfigError`](crate::config::ConfigError)):
//!   fatal at construction, never recovered. Building a scheduler with an
//!   invalid configuration is a programming error.
//! - **Step failures** ([`StepFailure`]): a panic escaping a single actor
//!   job step. Caught by the runner, forwarded to the configured
//!   [`RunnerErrorHandler`], and local to the failing step. The actor is
//!   not closed and its remaining jobs still run.
//! - **Future failures** ([`FutureError`]): an exceptional completion
//!   propagated through continuations. A normal outcome of asynchronous
//!   composition, not a runtime fault.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::actor::ActorId;

/// The error value carried by an exceptionally completed
/// [`ActorFuture`](crate::future::ActorFuture).
///
/// Cheap to clone: every continuation registered on a failed future
/// observes the same error value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FutureError {
    message: Arc<str>,
}

impl FutureError {
    /// Creates a new future error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into().into(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for FutureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FutureError {}

/// Report of a panic that escaped a single actor job step.
///
/// Delivered to the [`RunnerErrorHandler`] configured on the scheduler.
/// The runner thread survives and the actor keeps its remaining jobs.
#[derive(Debug, Clone)]
pub struct StepFailure {
    /// Identity of the actor whose step panicked.
    pub actor_id: ActorId,
    /// Diagnostic name of the actor.
    pub actor_name: String,
    /// Stringified panic payload.
    pub message: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step of actor {} ({}) panicked: {}",
            self.actor_id, self.actor_name, self.message
        )
    }
}

/// Callback invoked by a runner when a job step panics.
pub type RunnerErrorHandler = Arc<dyn Fn(StepFailure) + Send + Sync>;

/// The default error handler: logs the failure at error level.
#[must_use]
pub fn logging_error_handler() -> RunnerErrorHandler {
    Arc::new(|failure: StepFailure| {
        tracing::error!(
            actor = %failure.actor_id,
            name = %failure.actor_name,
            "actor step panicked: {}",
            failure.message
        );
    })
}

/// Returned by [`ActorFuture::join`](crate::future::ActorFuture::join) when
/// the future does not resolve within the given timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timed out waiting for future resolution")]
pub struct JoinTimeout;

/// Error from scheduler startup.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// An OS thread for a runner or the control loop could not be spawned.
    #[error("failed to spawn scheduler thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

/// Converts a panic payload into a printable message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
