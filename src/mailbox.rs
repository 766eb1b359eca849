//! Per-actor FIFO mailboxes.
//!
//! A mailbox is an unbounded queue owned by exactly one actor. Any number of
//! producers hold a cloned [`MailboxSender`] and enqueue without blocking; only the
//! owning actor's task holds the [`Mailbox`] receiver, so dequeues never race.
//!
//! Messages from a single sender are delivered in enqueue order. No ordering is
//! promised across senders.

use crate::error::RoutingError;
use crate::messages::Message;
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Creates a connected sender/mailbox pair for the actor `owner`.
pub fn channel(owner: impl Into<String>) -> (MailboxSender, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let owner = owner.into();
    (
        MailboxSender {
            owner: owner.clone(),
            tx,
        },
        Mailbox { owner, rx },
    )
}

/// Producer side of a mailbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    owner: String,
    tx: mpsc::UnboundedSender<Message>,
}

impl MailboxSender {
    /// Enqueues `message`. Never blocks.
    ///
    /// Fails with [`RoutingError::MailboxClosed`] once the owning actor has stopped
    /// and dropped its mailbox.
    pub fn send(&self, message: Message) -> Result<(), RoutingError> {
        self.tx
            .send(message)
            .map_err(|_| RoutingError::MailboxClosed(self.owner.clone()))
    }

    /// Name of the actor owning the receiving side.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns true once the owning actor has dropped its mailbox.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of a mailbox, held by the owning actor only.
#[derive(Debug)]
pub struct Mailbox {
    owner: String,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Mailbox {
    /// Dequeues the next pending message without waiting.
    ///
    /// Returns `None` when nothing is pending right now.
    pub fn try_next(&mut self) -> Option<Message> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Waits for the next message.
    ///
    /// Returns `None` only when every sender has been dropped.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Dequeues every message pending right now, in FIFO order, without waiting.
    pub fn drain(&mut self) -> Vec<Message> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true when no message is pending.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Name of the owning actor.
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Payload;

    fn payload_value(message: Message) -> u32 {
        match message {
            Message::User(payload) => payload.downcast::<u32>().unwrap(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn preserves_enqueue_order() {
        let (tx, mut mailbox) = channel("listener");
        for i in 0..100_u32 {
            tx.send(Message::User(Payload::new(i))).unwrap();
        }
        assert_eq!(mailbox.len(), 100);

        let values: Vec<u32> = mailbox.drain().into_iter().map(payload_value).collect();
        assert_eq!(values, (0..100).collect::<Vec<_>>());
        assert!(mailbox.is_empty());
    }

    #[test]
    fn try_next_on_empty_mailbox_returns_immediately() {
        let (_tx, mut mailbox) = channel("listener");
        assert!(mailbox.try_next().is_none());
        assert!(mailbox.drain().is_empty());
    }

    #[test]
    fn send_after_mailbox_dropped_reports_closed() {
        let (tx, mailbox) = channel("listener");
        drop(mailbox);
        assert!(tx.is_closed());
        let err = tx.send(Message::user("late")).unwrap_err();
        assert_eq!(err, RoutingError::MailboxClosed("listener".into()));
    }

    #[tokio::test]
    async fn concurrent_producers_keep_per_sender_order() {
        let (tx, mut mailbox) = channel("listener");
        let mut tasks = Vec::new();
        for sender in 0..4_u32 {
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move {
                for seq in 0..50_u32 {
                    tx.send(Message::user((sender, seq))).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut last_seen = [None::<u32>; 4];
        for message in mailbox.drain() {
            let Message::User(payload) = message else {
                panic!("expected user message");
            };
            let (sender, seq) = payload.downcast::<(u32, u32)>().unwrap();
            let slot = &mut last_seen[sender as usize];
            assert!(slot.map_or(true, |prev| prev < seq));
            *slot = Some(seq);
        }
        assert!(last_seen.iter().all(|s| *s == Some(49)));
    }

    #[tokio::test]
    async fn recv_waits_for_message() {
        let (tx, mut mailbox) = channel("listener");
        let handle = tokio::spawn(async move { mailbox.recv().await.map(|m| m.kind()) });
        tx.send(Message::user(1_u8)).unwrap();
        assert_eq!(
            handle.await.unwrap(),
            Some(crate::messages::MessageKind::User)
        );
    }
}
