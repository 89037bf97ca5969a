//! Network Transport - publish/subscribe seam for remote administration
//!
//! | Topic | Direction | Payload |
//! |-------|-----------|---------|
//! | `<prefix>/mode` | authority → node | `register` or anything else |
//! | `<prefix>/register` | authority → node | `cardKey\|label\|beaconId` |
//! | `<prefix>/command` | authority → node | `clear_all` |
//! | `<prefix>/card` | node → authority | forwarded card id, `04 A1 B2 C3` |
//! | `<prefix>/attendance` | node → authority | see [`payload::AttendancePayload`] |
//!
//! The client sits behind its own guard ([`SharedTransport`]) so maintenance
//! traffic and outcome publication never interleave. Delivery is
//! at-most-once: a publish while disconnected is skipped, never queued.
//!
//! Attendance rejections are published as `FRAUD` or `UNREGISTERED`. Older
//! authorities expect a single `INVALID` status for fraud and nothing at all
//! for unregistered cards, so they must be updated before pairing with this
//! node.

mod broker;
pub mod payload;

pub use broker::{BrokerClient, InMemoryBroker};
pub use payload::{AttendancePayload, RemoteEnrollment};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{AtlasError, AtlasResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    pub topic: String,
    pub payload: String,
}

impl TransportMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }
}

/// Pub/sub client driver
#[async_trait]
pub trait Transport: Send {
    fn is_connected(&self) -> bool;
    /// (Re)connect. Subscriptions do not survive a reconnect.
    async fn connect(&mut self) -> AtlasResult<()>;
    async fn subscribe(&mut self, topic: &str) -> AtlasResult<()>;
    async fn publish(&mut self, topic: &str, payload: &str) -> AtlasResult<()>;
    /// Messages received on subscribed topics since the last poll
    fn poll_inbound(&mut self) -> Vec<TransportMessage>;
}

/// Transport client behind a timed guard
pub struct SharedTransport {
    inner: Mutex<Box<dyn Transport>>,
    guard_timeout: Duration,
    skipped: AtomicU64,
}

impl SharedTransport {
    pub fn new(transport: Box<dyn Transport>, guard_timeout: Duration) -> Self {
        Self { inner: Mutex::new(transport), guard_timeout, skipped: AtomicU64::new(0) }
    }

    async fn guard(&self) -> AtlasResult<MutexGuard<'_, Box<dyn Transport>>> {
        tokio::time::timeout(self.guard_timeout, self.inner.lock())
            .await
            .map_err(|_| AtlasError::GuardTimeout { guard: "transport" })
    }

    pub async fn is_connected(&self) -> AtlasResult<bool> {
        Ok(self.guard().await?.is_connected())
    }

    /// Publish once. Skipped with `TransportUnavailable` when disconnected.
    pub async fn publish(&self, topic: &str, payload: &str) -> AtlasResult<()> {
        let mut client = self.guard().await?;
        if !client.is_connected() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(topic, "transport down, publish skipped");
            return Err(AtlasError::TransportUnavailable);
        }
        client.publish(topic, payload).await.inspect_err(|_| {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        })
    }

    /// Connect and subscribe to `topics` if currently disconnected.
    /// Returns true when a fresh connection was made.
    pub async fn maintain(&self, topics: &[String]) -> AtlasResult<bool> {
        let mut client = self.guard().await?;
        if client.is_connected() {
            return Ok(false);
        }
        client.connect().await?;
        for topic in topics {
            client.subscribe(topic).await?;
        }
        info!(topics = topics.len(), "transport connected and subscribed");
        Ok(true)
    }

    pub async fn drain(&self) -> AtlasResult<Vec<TransportMessage>> {
        Ok(self.guard().await?.poll_inbound())
    }

    /// Publishes skipped because the transport was down
    pub fn skipped(&self) -> u64 { self.skipped.load(Ordering::Relaxed) }
}
