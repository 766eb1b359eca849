//! The actor lifecycle contract and the message-driven run loop.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──> Preparing ──> Running ──> ShuttingDown ──> Stopped
//!                 │            │                            │
//!                 └────────────┴──────> Failed <────────────┘ (shutdown error)
//! ```
//!
//! The supervisor drives `Created -> Preparing -> Running`; the actor's own task
//! drives the rest. `Failed` is "stopped with an error": `prepare` or `run` failed
//! or panicked, `shutdown` returned an error, or the actor was force-terminated.
//!
//! # Messaging actors
//!
//! An actor that keeps the provided [`Actor::run`] is a *messaging actor*. Its loop
//! repeats two phases until a shutdown request arrives:
//!
//! 1. **drain**: dequeue every pending message without waiting and [`dispatch`] each
//!    in FIFO order;
//! 2. **step**: call [`Actor::run_step`] once.
//!
//! Drain never waits on an empty mailbox, so `run_step` runs every iteration
//! whether or not messages arrive. An actor that overrides `run` owns its loop
//! entirely and should pass the messages it reads to [`dispatch`].

use crate::error::{RoutingError, StateApplyError};
use crate::mailbox::Mailbox;
use crate::messages::{Message, Payload, ShutdownAck};
use crate::router::Router;
use crate::state::ActorState;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle phase of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorPhase {
    /// Registered, not started.
    Created,
    /// `prepare` is executing.
    Preparing,
    /// `run` is executing.
    Running,
    /// `shutdown` is executing.
    ShuttingDown,
    /// Stopped cleanly.
    Stopped,
    /// Stopped with an error.
    Failed,
}

impl ActorPhase {
    /// Returns true for `Stopped` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ActorPhase::Stopped | ActorPhase::Failed)
    }
}

/// Whether a messaging loop keeps going after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep running.
    Continue,
    /// A shutdown request was handled; leave the loop.
    Stop,
}

/// Everything an actor receives from the runtime besides its own state.
#[derive(Debug)]
pub struct ActorContext {
    name: String,
    mailbox: Mailbox,
    router: Router,
    phase: Arc<watch::Sender<ActorPhase>>,
    shutdown_invoked: bool,
    shutdown_error: Option<String>,
}

impl ActorContext {
    pub(crate) fn new(
        name: String,
        mailbox: Mailbox,
        router: Router,
        phase: Arc<watch::Sender<ActorPhase>>,
    ) -> Self {
        Self {
            name,
            mailbox,
            router,
            phase,
            shutdown_invoked: false,
            shutdown_error: None,
        }
    }

    /// Registry name of this actor.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This actor's mailbox.
    pub fn mailbox(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }

    /// Routing table for reaching peers.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Sends `message` to the actor named `to`.
    pub fn send(&self, to: &str, message: Message) -> Result<(), RoutingError> {
        self.router.send(to, message)
    }

    /// Sends `value` as a user message to the actor named `to`.
    pub fn send_user<T: Any + Send>(&self, to: &str, value: T) -> Result<(), RoutingError> {
        self.router.send_user(to, value)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ActorPhase {
        *self.phase.borrow()
    }

    /// Returns true once `shutdown` has been invoked for this actor.
    pub fn shutdown_invoked(&self) -> bool {
        self.shutdown_invoked
    }

    pub(crate) fn set_phase(&self, phase: ActorPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            tracing::debug!(from = ?previous, to = ?phase, "Actor phase changed");
        }
    }

    pub(crate) fn shutdown_error(&self) -> Option<&str> {
        self.shutdown_error.as_deref()
    }
}

/// The lifecycle contract implemented by every actor.
///
/// Only [`run`](Actor::run) distinguishes a plain actor from a messaging actor:
/// keep the provided implementation to get the drain-then-step loop, or override
/// it to write a fully custom loop.
#[async_trait]
pub trait Actor: Send + 'static {
    /// One-time setup before the actor's loop starts.
    ///
    /// An error isolates this actor: it never runs, while its siblings still start.
    async fn prepare(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// The actor's main body. Called once; must return once its work is done.
    async fn run(&mut self, ctx: &mut ActorContext) -> anyhow::Result<()> {
        run_messaging(self, ctx).await
    }

    /// One-time teardown. The runtime invokes it at most once, before the actor is
    /// considered stopped. `run` may or may not still be on the stack.
    async fn shutdown(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handles a message that is not a runtime control message. Discards by default.
    async fn handle_user_message(
        &mut self,
        ctx: &mut ActorContext,
        payload: Payload,
    ) -> anyhow::Result<()> {
        tracing::trace!(actor = ctx.name(), payload = payload.type_name(), "Discarding user message");
        Ok(())
    }

    /// One unit of repeating work, called once per loop iteration.
    async fn run_step(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns a value fully describing this actor's externally visible state.
    /// Must not mutate the actor.
    fn collect_state(&self) -> ActorState {
        ActorState::empty()
    }

    /// Applies a state previously returned by [`collect_state`](Actor::collect_state).
    ///
    /// On error the actor must keep its previous state.
    fn receive_state(&mut self, _state: &ActorState) -> Result<(), StateApplyError> {
        Ok(())
    }

    /// Live, non-persisted status for introspection by peers or a UI.
    fn collect_remote_state(&self) -> Option<serde_json::Value> {
        None
    }
}

/// The messaging actor loop: drain, then step, until a shutdown request is handled.
pub async fn run_messaging<A: Actor + ?Sized>(
    actor: &mut A,
    ctx: &mut ActorContext,
) -> anyhow::Result<()> {
    loop {
        while let Some(message) = ctx.mailbox.try_next() {
            if dispatch(actor, ctx, message).await? == Flow::Stop {
                return Ok(());
            }
        }
        actor.run_step(ctx).await?;
        // Lets sibling tasks and the timer driver progress when run_step never suspends.
        tokio::task::yield_now().await;
    }
}

/// Handles a single message on behalf of `actor`.
///
/// Shutdown requests invoke `shutdown` (once), acknowledge the requester and
/// return [`Flow::Stop`]. State requests are answered directly. User messages go to
/// [`Actor::handle_user_message`], whose errors are propagated.
pub async fn dispatch<A: Actor + ?Sized>(
    actor: &mut A,
    ctx: &mut ActorContext,
    message: Message,
) -> anyhow::Result<Flow> {
    match message {
        Message::RequestShutdown(request) => {
            shutdown_once(actor, ctx).await;
            request.acknowledge(ShutdownAck {
                actor: ctx.name.clone(),
                error: ctx.shutdown_error.clone(),
            });
            Ok(Flow::Stop)
        }
        Message::CollectState(respond_to) => {
            let _ = respond_to.send(actor.collect_state());
            Ok(Flow::Continue)
        }
        Message::ReceiveState { state, respond_to } => {
            let result = actor.receive_state(&state);
            if let Err(err) = &result {
                tracing::warn!(error = %err, "Rejected restored state");
            }
            let _ = respond_to.send(result);
            Ok(Flow::Continue)
        }
        Message::CollectRemoteState(respond_to) => {
            let _ = respond_to.send(actor.collect_remote_state());
            Ok(Flow::Continue)
        }
        Message::User(payload) => {
            actor.handle_user_message(ctx, payload).await?;
            Ok(Flow::Continue)
        }
    }
}

/// Invokes `actor.shutdown` unless it already ran for this context.
///
/// Errors and panics are recorded on the context rather than propagated.
pub(crate) async fn shutdown_once<A: Actor + ?Sized>(actor: &mut A, ctx: &mut ActorContext) {
    if ctx.shutdown_invoked {
        return;
    }
    ctx.shutdown_invoked = true;
    ctx.set_phase(ActorPhase::ShuttingDown);

    let outcome = AssertUnwindSafe(actor.shutdown(ctx)).catch_unwind().await;
    ctx.shutdown_error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(format!("{err:#}")),
        Err(panic) => Some(panic_message(panic.as_ref())),
    };
    if let Some(error) = &ctx.shutdown_error {
        tracing::error!(error = %error, "Actor shutdown failed");
    } else {
        tracing::info!("Actor shut down");
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

/// Messaging actor that logs every user message it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoActor;

#[async_trait]
impl Actor for EchoActor {
    async fn handle_user_message(
        &mut self,
        ctx: &mut ActorContext,
        payload: Payload,
    ) -> anyhow::Result<()> {
        if let Some(text) = payload.downcast_ref::<String>() {
            tracing::info!(actor = ctx.name(), "{text}");
        } else if let Some(text) = payload.downcast_ref::<&'static str>() {
            tracing::info!(actor = ctx.name(), "{text}");
        } else {
            tracing::info!(actor = ctx.name(), payload = payload.type_name(), "Received message");
        }
        Ok(())
    }
}
