//! Origin-tagged message channels
//!
//! The host side listens on a shared [`MessageBus`]: every render surface in
//! the same document posts into it, so each listener must filter by the
//! sender's [`ContextId`]. Every listener has its own unbounded queue, so a
//! slow listener never loses messages. The host talks to a single surface
//! through that surface's own inbox. Posting never blocks and never waits
//! for a reply.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::message::Message;

/// Identity of an execution context (a host or a render surface)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell instances apart in logs
        let id = self.0.simple().to_string();
        write!(f, "{}", &id[..8])
    }
}

/// A message together with the context that sent it
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source: ContextId,
    pub message: Message,
}

/// Sending half bound to a fixed source identity
#[derive(Debug, Clone)]
pub struct Outlet {
    source: ContextId,
    target: Target,
}

#[derive(Debug, Clone)]
enum Target {
    Bus(MessageBus),
    Inbox(mpsc::UnboundedSender<Envelope>),
}

impl Outlet {
    /// Post a message. Returns `false` if nobody is listening any more.
    pub fn post(&self, message: Message) -> bool {
        let kind = message.kind();
        let envelope = Envelope {
            source: self.source,
            message,
        };
        let delivered = match &self.target {
            Target::Bus(bus) => bus.publish(envelope),
            Target::Inbox(tx) => tx.send(envelope).is_ok(),
        };
        if !delivered {
            debug!(source = %self.source, kind, "No receiver for message");
        }
        delivered
    }

    pub fn source(&self) -> ContextId {
        self.source
    }
}

/// Receiving end of a bus subscription
pub type Listener = mpsc::UnboundedReceiver<Envelope>;

/// Shared document-level message bus (surface -> host direction)
#[derive(Debug, Clone, Default)]
pub struct MessageBus {
    listeners: Arc<Mutex<Vec<mpsc::UnboundedSender<Envelope>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start listening. Every listener sees every message posted afterwards.
    /// Dropping the listener unsubscribes it.
    pub fn subscribe(&self) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Outlet that posts into the bus as `source`
    pub fn outlet(&self, source: ContextId) -> Outlet {
        Outlet {
            source,
            target: Target::Bus(self.clone()),
        }
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.lock();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }

    /// Deliver to every live listener. Returns `false` if there was none.
    fn publish(&self, envelope: Envelope) -> bool {
        let mut listeners = self.lock();
        listeners.retain(|tx| !tx.is_closed());
        let mut delivered = false;
        for tx in listeners.iter() {
            delivered |= tx.send(envelope.clone()).is_ok();
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<Envelope>>> {
        // The list stays consistent even if a holder panicked
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a private inbox for a single context (host -> surface direction).
///
/// The returned outlet posts as `source`.
pub fn inbox(source: ContextId) -> (Outlet, mpsc::UnboundedReceiver<Envelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Outlet {
            source,
            target: Target::Inbox(tx),
        },
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_tags_source() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe();
        let a = ContextId::new();
        let b = ContextId::new();

        assert!(bus.outlet(a).post(Message::ViewerReady));
        assert!(bus.outlet(b).post(Message::Unknown));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.source, a);
        assert_eq!(first.message, Message::ViewerReady);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.source, b);
    }

    #[tokio::test]
    async fn test_inbox_reports_closed_receiver() {
        let host = ContextId::new();
        let (outlet, mut rx) = inbox(host);
        assert!(outlet.post(Message::resize(10.0, 20.0)));
        assert_eq!(rx.recv().await.unwrap().source, host);

        drop(rx);
        assert!(!outlet.post(Message::resize(10.0, 20.0)));
    }

    #[tokio::test]
    async fn test_bus_never_drops_for_slow_listener() {
        let bus = MessageBus::new();
        let mut slow = bus.subscribe();
        let surfaces: Vec<ContextId> = (0..500).map(|_| ContextId::new()).collect();
        for id in &surfaces {
            assert!(bus.outlet(*id).post(Message::ViewerReady));
        }

        for id in &surfaces {
            assert_eq!(slow.recv().await.unwrap().source, *id);
        }
        assert!(slow.try_recv().is_err());
    }

    #[test]
    fn test_dropped_listener_unsubscribes() {
        let bus = MessageBus::new();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        assert_eq!(bus.listener_count(), 2);
        drop(dropped);
        assert_eq!(bus.listener_count(), 1);
        assert!(bus.outlet(ContextId::new()).post(Message::ViewerReady));
        drop(kept);
        assert!(!bus.outlet(ContextId::new()).post(Message::ViewerReady));
    }

    #[test]
    fn test_bus_without_listeners() {
        let bus = MessageBus::default();
        assert!(!bus.outlet(ContextId::new()).post(Message::ViewerReady));
    }

    #[test]
    fn test_context_id_display_is_short() {
        let id = ContextId::new();
        assert_eq!(id.to_string().len(), 8);
        assert_ne!(id, ContextId::new());
    }
}
