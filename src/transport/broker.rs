//! In-process broker standing in for the remote pub/sub server.
//!
//! Uses `tokio::sync::broadcast` for multi-producer, multi-consumer fan-out.
//! Each [`BrokerClient`] filters the shared stream by its own subscriptions.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use super::{Transport, TransportMessage};
use crate::error::{AtlasError, AtlasResult};

const DEFAULT_CAPACITY: usize = 256;

pub struct InMemoryBroker {
    sender: broadcast::Sender<TransportMessage>,
    online: AtomicBool,
    messages_published: AtomicU64,
}

impl Default for InMemoryBroker {
    fn default() -> Self { Self::new() }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, online: AtomicBool::new(true), messages_published: AtomicU64::new(0) }
    }

    /// New client bound to this broker, initially disconnected
    pub fn client(self: &Arc<Self>) -> BrokerClient {
        BrokerClient { broker: self.clone(), rx: None, subscriptions: HashSet::new() }
    }

    /// Publish on behalf of a remote party. Returns receivers reached.
    pub fn publish(&self, topic: &str, payload: &str) -> usize {
        if !self.is_online() {
            debug!(topic, "broker offline, message lost");
            return 0;
        }
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(TransportMessage::new(topic, payload)).unwrap_or(0)
    }

    /// Every message on every topic, for an authority or a test
    pub fn monitor(&self) -> broadcast::Receiver<TransportMessage> {
        self.sender.subscribe()
    }

    /// Take the broker down or bring it back. Clients see the drop on their next call.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool { self.online.load(Ordering::SeqCst) }

    pub fn messages_published(&self) -> u64 { self.messages_published.load(Ordering::Relaxed) }

    /// Connected clients plus monitors
    pub fn subscriber_count(&self) -> usize { self.sender.receiver_count() }
}

pub struct BrokerClient {
    broker: Arc<InMemoryBroker>,
    rx: Option<broadcast::Receiver<TransportMessage>>,
    subscriptions: HashSet<String>,
}

#[async_trait]
impl Transport for BrokerClient {
    fn is_connected(&self) -> bool {
        self.rx.is_some() && self.broker.is_online()
    }

    async fn connect(&mut self) -> AtlasResult<()> {
        if !self.broker.is_online() {
            self.rx = None;
            return Err(AtlasError::TransportUnavailable);
        }
        self.subscriptions.clear();
        self.rx = Some(self.broker.monitor());
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> AtlasResult<()> {
        if !self.is_connected() {
            return Err(AtlasError::TransportUnavailable);
        }
        self.subscriptions.insert(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> AtlasResult<()> {
        if !self.is_connected() {
            return Err(AtlasError::TransportUnavailable);
        }
        self.broker.publish(topic, payload);
        Ok(())
    }

    fn poll_inbound(&mut self) -> Vec<TransportMessage> {
        if !self.broker.is_online() {
            self.rx = None;
        }
        let Some(rx) = self.rx.as_mut() else {
            return Vec::new();
        };
        let mut inbound = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(msg) if self.subscriptions.contains(&msg.topic) => inbound.push(msg),
                Ok(_) => {}
                Err(TryRecvError::Lagged(n)) => warn!(missed = n, "transport receiver lagged"),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    self.rx = None;
                    break;
                }
            }
        }
        inbound
    }
}
