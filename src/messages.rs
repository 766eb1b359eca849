//! Message types for actor mailboxes.
//!
//! Every mailbox carries [`Message`] values. The runtime distinguishes a small,
//! closed set of built-in kinds from opaque user payloads:
//!
//! - [`Message::RequestShutdown`]: asks the actor to tear down. It carries a
//!   [`ShutdownRequest`] whose oneshot channel the actor signals once `shutdown()`
//!   has completed, so the requester can await the acknowledgement.
//! - [`Message::CollectState`], [`Message::ReceiveState`] and
//!   [`Message::CollectRemoteState`]: control requests used by the supervisor to
//!   reach a *running* actor's state. They are serviced between dispatches, never
//!   while a user message is being handled.
//! - [`Message::User`]: anything else. The [`Payload`] is opaque to the runtime and
//!   is forwarded to `Actor::handle_user_message`.
//!
//! # Request/response
//!
//! Control messages follow the same pattern as the rest of the crate: the
//! sender creates a oneshot channel, embeds the sender half in the message and
//! awaits the receiver half.
//!
//! ```text
//! Supervisor                         Actor Task
//! ----------                         ----------
//! 1. ShutdownRequest::new()
//! 2. Send via mailbox         ------>
//!                                    3. Drain picks up request
//!                                    4. actor.shutdown()
//!                                    5. request.acknowledge(..)
//! 6. Await ack receiver       <------
//! ```

use crate::error::StateApplyError;
use crate::state::ActorState;
use std::any::Any;
use std::fmt;
use tokio::sync::oneshot;

/// The kind of a [`Message`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Shutdown request.
    RequestShutdown,
    /// State capture request.
    CollectState,
    /// State restore request.
    ReceiveState,
    /// Live (non-persisted) status request.
    CollectRemoteState,
    /// Actor-defined payload.
    User,
}

impl MessageKind {
    /// Returns true for the kinds the runtime handles itself.
    pub fn is_control(self) -> bool {
        !matches!(self, MessageKind::User)
    }
}

/// A value in an actor's mailbox.
pub enum Message {
    /// Tear down the actor and acknowledge through the embedded channel.
    RequestShutdown(ShutdownRequest),
    /// Reply with `Actor::collect_state`.
    CollectState(oneshot::Sender<ActorState>),
    /// Apply a state with `Actor::receive_state` and reply with the outcome.
    ReceiveState {
        /// State previously produced by `collect_state`.
        state: ActorState,
        /// Outcome of the restore.
        respond_to: oneshot::Sender<Result<(), StateApplyError>>,
    },
    /// Reply with `Actor::collect_remote_state`.
    CollectRemoteState(oneshot::Sender<Option<serde_json::Value>>),
    /// Actor-defined message.
    User(Payload),
}

impl Message {
    /// Wraps any sendable value as a user message.
    pub fn user<T: Any + Send>(value: T) -> Self {
        Message::User(Payload::new(value))
    }

    /// Returns the kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::RequestShutdown(_) => MessageKind::RequestShutdown,
            Message::CollectState(_) => MessageKind::CollectState,
            Message::ReceiveState { .. } => MessageKind::ReceiveState,
            Message::CollectRemoteState(_) => MessageKind::CollectRemoteState,
            Message::User(_) => MessageKind::User,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::User(payload) => f.debug_tuple("User").field(payload).finish(),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

/// An opaque, actor-defined message body.
pub struct Payload {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Payload {
    /// Boxes `value` as a payload.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Name of the payload's concrete type, for logging.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns true if the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrows the payload as a `T`, if it is one.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Takes the payload as a `T`, giving it back unchanged if it is not one.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { value, type_name }),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Acknowledgement sent by an actor after its `shutdown()` completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownAck {
    /// Name of the acknowledging actor.
    pub actor: String,
    /// Error returned by `shutdown()`, if any. The actor is stopped either way.
    pub error: Option<String>,
}

/// Receiver half of a [`ShutdownRequest`].
pub type ShutdownAckReceiver = oneshot::Receiver<ShutdownAck>;

/// A request for an actor to shut down.
///
/// Acknowledging consumes the request, so an actor can acknowledge at most once.
#[derive(Debug)]
pub struct ShutdownRequest {
    respond_to: oneshot::Sender<ShutdownAck>,
}

impl ShutdownRequest {
    /// Creates a request and the receiver that resolves once it is acknowledged.
    pub fn new() -> (Self, ShutdownAckReceiver) {
        let (tx, rx) = oneshot::channel();
        (Self { respond_to: tx }, rx)
    }

    /// Signals the requester that shutdown has completed.
    ///
    /// A requester that stopped waiting (e.g. after a timeout) is not an error.
    pub fn acknowledge(self, ack: ShutdownAck) {
        if self.respond_to.send(ack).is_err() {
            tracing::debug!("Shutdown requester went away before acknowledgement");
        }
    }

    /// Wraps the request as a mailbox message.
    pub fn into_message(self) -> Message {
        Message::RequestShutdown(self)
    }
}
