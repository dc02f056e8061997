//! Topic Subscription Manager
//!
//! Tracks the one conversation topic the session is bound to. Switching
//! conversations always releases the previous subscription before the new
//! one is created, so two topics never deliver at the same time.

use crate::message::ConversationId;

/// An active topic subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// STOMP subscription id (`sub-<n>`)
    pub id: String,
    /// Bound conversation
    pub conversation: ConversationId,
    /// Topic destination
    pub destination: String,
}

/// Result of a subscribe call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    /// Subscription to release first, if any
    pub released: Option<Subscription>,
    /// Newly active subscription
    pub active: Subscription,
}

/// Single-subscription bookkeeping
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    next_id: u64,
    active: Option<Subscription>,
}

impl SubscriptionManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently active subscription
    pub fn active(&self) -> Option<&Subscription> {
        self.active.as_ref()
    }

    /// Replace the active subscription
    ///
    /// Always produces a fresh subscription id, even when re-subscribing to
    /// the same conversation; late deliveries for the old id are then
    /// recognisable and dropped.
    pub fn subscribe(
        &mut self,
        conversation: ConversationId,
        destination: impl Into<String>,
    ) -> SubscriptionChange {
        let released = self.active.take();
        let active = Subscription {
            id: format!("sub-{}", self.next_id),
            conversation,
            destination: destination.into(),
        };
        self.next_id += 1;
        self.active = Some(active.clone());
        SubscriptionChange { released, active }
    }

    /// Release the active subscription, if any
    pub fn unsubscribe(&mut self) -> Option<Subscription> {
        self.active.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_twice_same_conversation() {
        let mut manager = SubscriptionManager::new();

        let first = manager.subscribe(ConversationId(42), "/topic/conversation-42");
        assert!(first.released.is_none());

        let second = manager.subscribe(ConversationId(42), "/topic/conversation-42");
        assert_eq!(second.released.as_ref(), Some(&first.active));
        assert_ne!(second.active.id, first.active.id);

        let active = manager.active().unwrap();
        assert_eq!(active.conversation, ConversationId(42));
        assert_eq!(active.id, second.active.id);
    }

    #[test]
    fn test_switch_releases_previous() {
        let mut manager = SubscriptionManager::new();
        manager.subscribe(ConversationId(1), "/topic/conversation-1");
        let change = manager.subscribe(ConversationId(2), "/topic/conversation-2");

        assert_eq!(change.released.unwrap().conversation, ConversationId(1));
        assert_eq!(manager.active().unwrap().destination, "/topic/conversation-2");
    }

    #[test]
    fn test_unsubscribe_is_safe_when_empty() {
        let mut manager = SubscriptionManager::new();
        assert!(manager.unsubscribe().is_none());

        manager.subscribe(ConversationId(5), "/topic/conversation-5");
        assert!(manager.unsubscribe().is_some());
        assert!(manager.unsubscribe().is_none());
        assert!(manager.active().is_none());
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut manager = SubscriptionManager::new();
        let ids: Vec<_> = (0..3)
            .map(|i| manager.subscribe(ConversationId(i), "t").active.id)
            .collect();
        assert_eq!(ids, vec!["sub-0", "sub-1", "sub-2"]);
    }
}
