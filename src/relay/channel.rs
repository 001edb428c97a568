// src/relay/channel.rs
//! Liveness-checked delivery between contexts
//!
//! A context may be torn down at any instant. Sends never fail with an error;
//! they report [`Delivery::ContextGone`] and the caller decides whether to
//! prune the peer.

use crate::interception::gate::CaptureSink;
use crate::observability::RELAY_CONTEXT_GONE;
use crate::recording::record::{CaptureRecord, ContextId};
use crate::relay::protocol::PageMessage;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Outcome of a send to another context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    ContextGone,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

fn note_context_gone(context: ContextId) {
    metrics::counter!(RELAY_CONTEXT_GONE).increment(1);
    debug!("Context {} is gone, message dropped", context);
}

/// Sending half towards one context
#[derive(Debug)]
pub struct ContextSender<T> {
    context: ContextId,
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for ContextSender<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context,
            tx: self.tx.clone(),
        }
    }
}

impl<T> ContextSender<T> {
    pub fn new(context: ContextId, tx: mpsc::UnboundedSender<T>) -> Self {
        Self { context, tx }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn deliver(&self, message: T) -> Delivery {
        if !self.is_alive() {
            note_context_gone(self.context);
            return Delivery::ContextGone;
        }
        match self.tx.send(message) {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                note_context_gone(self.context);
                Delivery::ContextGone
            }
        }
    }
}

/// Contexts registered for pushes from the authority
pub struct ContextRegistry<T> {
    peers: DashMap<ContextId, ContextSender<T>>,
}

impl<T> Default for ContextRegistry<T> {
    fn default() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }
}

impl<T: Clone> ContextRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `context`, replacing any previous registration
    pub fn register(&self, context: ContextId) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.insert(context, ContextSender::new(context, tx));
        debug!("Context {} registered", context);
        rx
    }

    pub fn unregister(&self, context: ContextId) {
        self.peers.remove(&context);
    }

    /// Push `message` to every live context and prune dead ones
    ///
    /// Returns the number of contexts that received it.
    pub fn broadcast(&self, message: &T) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();

        for peer in self.peers.iter() {
            match peer.value().deliver(message.clone()) {
                Delivery::Delivered => delivered += 1,
                Delivery::ContextGone => gone.push(*peer.key()),
            }
        }

        for context in gone {
            self.peers.remove(&context);
        }
        delivered
    }

    /// Drop every registration; receivers observe the end of their stream
    pub fn clear(&self) {
        self.peers.clear();
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Page message bus
///
/// Every value is seen by every subscriber on the page, including the
/// sender's own listener, mirroring a shared window message channel.
#[derive(Debug, Clone)]
pub struct PageBus {
    context: ContextId,
    tx: broadcast::Sender<Value>,
}

impl PageBus {
    pub fn new(context: ContextId, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { context, tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.tx.subscribe()
    }

    /// Post a raw value; `ContextGone` when nobody listens
    pub fn post_value(&self, value: Value) -> Delivery {
        match self.tx.send(value) {
            Ok(_) => Delivery::Delivered,
            Err(_) => {
                note_context_gone(self.context);
                Delivery::ContextGone
            }
        }
    }

    pub fn post(&self, message: &PageMessage) -> Delivery {
        self.post_value(message.to_value())
    }
}

impl CaptureSink for PageBus {
    fn submit(&self, record: CaptureRecord) -> bool {
        self.post(&PageMessage::Capture(Box::new(record))).is_delivered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_to_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel::<u32>();
        let sender = ContextSender::new(1, tx);
        assert_eq!(sender.deliver(1), Delivery::Delivered);

        drop(rx);
        assert!(!sender.is_alive());
        assert_eq!(sender.deliver(2), Delivery::ContextGone);
    }

    #[tokio::test]
    async fn test_broadcast_prunes_dead_contexts() {
        let registry = ContextRegistry::<u32>::new();
        let mut alive = registry.register(1);
        let dead = registry.register(2);
        drop(dead);

        assert_eq!(registry.broadcast(&7), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(alive.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_reregister_replaces_old_channel() {
        let registry = ContextRegistry::<u32>::new();
        let mut old = registry.register(5);
        let mut new = registry.register(5);

        assert_eq!(registry.broadcast(&1), 1);
        assert_eq!(new.recv().await, Some(1));
        assert!(old.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_page_bus_without_listeners() {
        let bus = PageBus::new(3, 8);
        assert_eq!(bus.post(&PageMessage::RequestState), Delivery::ContextGone);

        let mut rx = bus.subscribe();
        assert!(bus.post(&PageMessage::RequestState).is_delivered());
        let value = rx.recv().await.unwrap();
        assert_eq!(PageMessage::from_value(&value), Some(PageMessage::RequestState));
    }
}
