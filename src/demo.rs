//! Small actors used by the `demo` command and the integration tests.
//!
//! [`Speaker`] periodically greets a peer, [`Listener`] records what it hears and
//! [`Counter`] is the minimal actor with persistent state.

use crate::actor::{Actor, ActorContext};
use crate::error::{RoutingError, StateApplyError};
use crate::messages::Payload;
use crate::state::ActorState;
use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// Greeting sent by [`Speaker`].
pub const GREETING: &str = "Hello";

/// Sends [`GREETING`] to `target` once per interval.
#[derive(Debug, Clone)]
pub struct Speaker {
    target: String,
    interval: Duration,
    limit: Option<u64>,
    sent: u64,
}

impl Speaker {
    /// Greets `target` every `interval`, without limit.
    pub fn new(target: impl Into<String>, interval: Duration) -> Self {
        Self {
            target: target.into(),
            interval,
            limit: None,
            sent: 0,
        }
    }

    /// Stop greeting after `limit` messages.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Greetings sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

#[async_trait]
impl Actor for Speaker {
    async fn prepare(&mut self, ctx: &mut ActorContext) -> anyhow::Result<()> {
        if !ctx.router().contains(&self.target) {
            bail!("no actor named '{}' to speak to", self.target);
        }
        info!("Starting speaker.");
        Ok(())
    }

    async fn run_step(&mut self, ctx: &mut ActorContext) -> anyhow::Result<()> {
        tokio::time::sleep(self.interval).await;
        if self.limit.is_some_and(|limit| self.sent >= limit) {
            return Ok(());
        }
        match ctx.send_user(&self.target, GREETING.to_string()) {
            Ok(()) => self.sent += 1,
            Err(RoutingError::MailboxClosed(peer)) => {
                warn!(%peer, "Listener is gone, not greeting");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    fn collect_remote_state(&self) -> Option<serde_json::Value> {
        Some(json!({ "sent": self.sent }))
    }
}

/// Persisted state of a [`Listener`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerState {
    /// Messages in arrival order.
    pub received: Vec<String>,
}

/// Records every text message it receives.
#[derive(Debug, Clone, Default)]
pub struct Listener {
    state: ListenerState,
}

impl Listener {
    /// Creates a listener that has heard nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far, oldest first.
    pub fn received(&self) -> &[String] {
        &self.state.received
    }
}

#[async_trait]
impl Actor for Listener {
    async fn prepare(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        info!("Starting listener.");
        Ok(())
    }

    async fn handle_user_message(
        &mut self,
        _ctx: &mut ActorContext,
        payload: Payload,
    ) -> anyhow::Result<()> {
        let text = match payload.downcast::<String>() {
            Ok(text) => text,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(text) => text.to_string(),
                Err(other) => {
                    warn!(payload = other.type_name(), "Listener ignores non-text message");
                    return Ok(());
                }
            },
        };
        info!("{text}");
        self.state.received.push(text);
        Ok(())
    }

    fn collect_state(&self) -> ActorState {
        ActorState::from(json!({ "received": self.state.received }))
    }

    fn receive_state(&mut self, state: &ActorState) -> Result<(), StateApplyError> {
        self.state = state.decode()?;
        Ok(())
    }

    fn collect_remote_state(&self) -> Option<serde_json::Value> {
        Some(json!({ "count": self.state.received.len() }))
    }
}

/// Commands understood by [`Counter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterCommand {
    /// Adds one.
    Increment,
    /// Adds `n`, saturating at `u64::MAX`.
    Add(u64),
    /// Back to zero.
    Reset,
}

/// Persisted state of a [`Counter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    /// Current count.
    pub count: u64,
}

/// Counts [`CounterCommand`]s.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    state: CounterState,
}

impl Counter {
    /// Starts counting from zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from `count` instead of zero.
    pub fn starting_at(count: u64) -> Self {
        Self {
            state: CounterState { count },
        }
    }

    /// Current count.
    pub fn count(&self) -> u64 {
        self.state.count
    }
}

#[async_trait]
impl Actor for Counter {
    async fn handle_user_message(
        &mut self,
        ctx: &mut ActorContext,
        payload: Payload,
    ) -> anyhow::Result<()> {
        let Some(command) = payload.downcast_ref::<CounterCommand>() else {
            bail!("{} cannot handle {}", ctx.name(), payload.type_name());
        };
        match *command {
            CounterCommand::Increment => self.state.count = self.state.count.saturating_add(1),
            CounterCommand::Add(n) => self.state.count = self.state.count.saturating_add(n),
            CounterCommand::Reset => self.state.count = 0,
        }
        Ok(())
    }

    fn collect_state(&self) -> ActorState {
        ActorState::from(json!({ "count": self.state.count }))
    }

    fn receive_state(&mut self, state: &ActorState) -> Result<(), StateApplyError> {
        self.state = state.decode()?;
        Ok(())
    }

    fn collect_remote_state(&self) -> Option<serde_json::Value> {
        Some(json!({ "count": self.state.count }))
    }
}
