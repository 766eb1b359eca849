//! # DAQ Actors Runtime
//!
//! This crate is the actor runtime for a data-acquisition application. Instruments and
//! experiment logic run as independent actors, each in its own Tokio task, talking to
//! each other and to the application through private mailboxes. A single
//! [`Supervisor`](supervisor::Supervisor) owns the actor registry and drives startup,
//! routing, shutdown and state snapshots.
//!
//! ## Crate Structure
//!
//! - **`actor`**: The `Actor` trait, its lifecycle phases and the messaging loop
//!   (drain the mailbox, then take one step of periodic work).
//! - **`mailbox`**: Per-actor FIFO queues with non-blocking send.
//! - **`messages`**: The `Message` envelope, shutdown requests and acknowledgements.
//! - **`router`**: The frozen name -> mailbox table handed to every actor.
//! - **`supervisor`**: Registry, concurrent start, graceful/forced shutdown and
//!   snapshot collection/restore.
//! - **`state`**: `ActorState`, `Snapshot` and their JSON persistence.
//! - **`data`**: Run data and pluggable savers (JSON, CSV, no-op).
//! - **`metadata`**: Run metadata attached to saved runs.
//! - **`config`**: Figment-based runtime configuration (TOML + environment).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: Error types for every subsystem, plus the umbrella `DaqError`.
//! - **`demo`**: Speaker, Listener and Counter actors.

pub mod actor;
pub mod config;
pub mod data;
pub mod demo;
pub mod error;
pub mod logging;
pub mod mailbox;
pub mod messages;
pub mod metadata;
pub mod router;
pub mod state;
pub mod supervisor;

pub use actor::{dispatch, run_messaging, Actor, ActorContext, ActorPhase, Flow};
pub use error::{AppResult, DaqError};
pub use messages::{Message, Payload};
pub use state::{ActorState, Snapshot};
pub use supervisor::{ActorEvent, ShutdownReport, Supervisor, SupervisorBuilder};
