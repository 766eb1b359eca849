//! Custom error types for the actor runtime.
//!
//! Each failure domain of the runtime has its own `thiserror` enum so callers can
//! match on exactly the failures an operation can produce:
//!
//! - **`RegistryError`**: an actor could not be registered (empty or duplicate name).
//! - **`StartupError`**: one or more actors failed `prepare`. Startup is isolated per
//!   actor, so this error is returned only after every other actor has been started.
//! - **`RoutingError`**: a message was addressed to an unknown actor, or to an actor
//!   whose mailbox has closed because the actor stopped.
//! - **`ShutdownTimeoutError`**: an actor did not acknowledge a shutdown request in
//!   time. It is recorded and logged; the actor is force-terminated.
//! - **`StateApplyError`**: an actor rejected (or could not be reached for) a state
//!   restore. The actor keeps its pre-restore state.
//! - **`SaveError`**: a persistence backend failed to write a run.
//!
//! `DaqError` consolidates all of them for application code that only wants a
//! single error type and the `?` operator.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Top-level error for applications built on the runtime.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid actor registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// One or more actors failed to start.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// A message could not be delivered.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// An actor had to be force-terminated.
    #[error(transparent)]
    ShutdownTimeout(#[from] ShutdownTimeoutError),

    /// A restored state was not applied.
    #[error(transparent)]
    StateApply(#[from] StateApplyError),

    /// Persisting a run failed.
    #[error(transparent)]
    Save(#[from] SaveError),
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

/// Errors raised while building the actor registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An actor was registered under a blank name.
    #[error("Actor names must not be empty")]
    EmptyName,

    /// Two actors share a name.
    #[error("Actor '{0}' is already registered")]
    DuplicateName(String),
}

/// A single actor whose `prepare` failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareFailure {
    /// Name of the actor that failed to start.
    pub actor: String,
    /// Rendered error returned by `prepare` (or the panic message).
    pub reason: String,
}

/// Errors raised by `Supervisor::start`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    /// `start` was called twice.
    #[error("Supervisor has already been started")]
    AlreadyStarted,

    /// Some actors failed `prepare`; the rest are running.
    #[error("{} actor(s) failed to prepare: {}", failures.len(), render_failures(failures))]
    PrepareFailed {
        /// Every actor that was isolated because its `prepare` failed.
        failures: Vec<PrepareFailure>,
    },
}

fn render_failures(failures: &[PrepareFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.actor, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while routing a message into a mailbox.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// No actor is registered under the name.
    #[error("No actor named '{0}' is registered")]
    UnknownActor(String),

    /// The actor has stopped and no longer receives.
    #[error("Mailbox of actor '{0}' is closed (actor has stopped)")]
    MailboxClosed(String),
}

/// An actor did not acknowledge a shutdown request within its budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Actor '{actor}' did not acknowledge shutdown within {timeout:?}")]
pub struct ShutdownTimeoutError {
    /// Name of the actor that was force-terminated.
    pub actor: String,
    /// The per-actor timeout that elapsed.
    pub timeout: Duration,
}

/// Errors raised when an actor cannot take a restored state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateApplyError {
    /// The state does not match the actor's state type.
    #[error("Failed to decode actor state: {0}")]
    Decode(String),

    /// The actor refused an otherwise well-formed state.
    #[error("Actor rejected state: {0}")]
    Rejected(String),

    /// The actor could not be reached.
    #[error("Actor '{actor}' is unavailable: {reason}")]
    Unavailable {
        /// Actor that could not be reached.
        actor: String,
        /// Why the state request did not complete.
        reason: String,
    },
}

/// Errors raised by run persistence backends.
#[derive(Error, Debug)]
pub enum SaveError {
    /// No saver is registered under the format.
    #[error("Unknown save format '{0}'")]
    UnknownFormat(String),

    /// Writing a run file failed.
    #[error("I/O error while saving: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failed.
    #[error("Serialization error while saving: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding failed.
    #[cfg(feature = "storage_csv")]
    #[error("CSV error while saving: {0}")]
    Csv(#[from] csv::Error),

    /// The blocking save task panicked or was cancelled.
    #[error("Background save task failed: {0}")]
    Background(String),
}
