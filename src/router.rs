//! Name-based message routing.
//!
//! The [`Router`] is the frozen routing table created when the supervisor's registry
//! is built. It is handed explicitly to every actor through its context, so actors
//! address peers by name without any process-wide lookup.

use crate::error::RoutingError;
use crate::mailbox::MailboxSender;
use crate::messages::Message;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only map from actor name to mailbox sender. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Arc<HashMap<String, MailboxSender>>,
}

impl Router {
    pub(crate) fn new(routes: HashMap<String, MailboxSender>) -> Self {
        Self {
            routes: Arc::new(routes),
        }
    }

    /// Enqueues `message` into the mailbox of `actor`.
    pub fn send(&self, actor: &str, message: Message) -> Result<(), RoutingError> {
        self.routes
            .get(actor)
            .ok_or_else(|| RoutingError::UnknownActor(actor.to_string()))?
            .send(message)
    }

    /// Enqueues `value` as a user message into the mailbox of `actor`.
    pub fn send_user<T: Any + Send>(&self, actor: &str, value: T) -> Result<(), RoutingError> {
        self.send(actor, Message::user(value))
    }

    /// Sender for `actor`'s mailbox, if registered.
    pub fn sender(&self, actor: &str) -> Option<&MailboxSender> {
        self.routes.get(actor)
    }

    /// Returns true if `actor` is registered.
    pub fn contains(&self, actor: &str) -> bool {
        self.routes.contains_key(actor)
    }

    /// Registered actor names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox;

    #[test]
    fn routes_by_name_and_rejects_unknown() {
        let (tx, mut listener) = mailbox::channel("listens");
        let router = Router::new(HashMap::from([("listens".to_string(), tx)]));

        router.send_user("listens", "Hello").unwrap();
        assert_eq!(listener.len(), 1);

        let err = router.send_user("nobody", "Hello").unwrap_err();
        assert_eq!(err, RoutingError::UnknownActor("nobody".into()));
        assert!(listener.try_next().is_some());
    }

    #[test]
    fn names_are_sorted() {
        let (a, _ra) = mailbox::channel("speaks");
        let (b, _rb) = mailbox::channel("listens");
        let router = Router::new(HashMap::from([
            ("speaks".to_string(), a),
            ("listens".to_string(), b),
        ]));
        assert_eq!(router.names(), vec!["listens", "speaks"]);
        assert!(router.contains("speaks"));
        assert!(router.sender("ghost").is_none());
    }
}
