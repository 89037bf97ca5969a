//! Bounded event channels with drop-on-full producers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::warn;

use crate::error::{AtlasError, AtlasResult};

/// Producer half. Waits at most `wait` for space, then drops the event.
pub struct EventSender<T> {
    channel: &'static str,
    tx: mpsc::Sender<T>,
    wait: Duration,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self { channel: self.channel, tx: self.tx.clone(), wait: self.wait, dropped: self.dropped.clone() }
    }
}

pub fn bounded<T>(channel: &'static str, capacity: usize, wait: Duration) -> (EventSender<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { channel, tx, wait, dropped: Arc::new(AtomicU64::new(0)) }, rx)
}

impl<T> EventSender<T> {
    pub async fn send(&self, event: T) -> AtlasResult<()> {
        match self.tx.send_timeout(event, self.wait).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(channel = self.channel, dropped = total, "channel full, event dropped");
                Err(AtlasError::ChannelFull { channel: self.channel })
            }
            Err(SendTimeoutError::Closed(_)) => Err(AtlasError::ChannelClosed { channel: self.channel }),
        }
    }

    pub fn name(&self) -> &'static str { self.channel }

    /// Events dropped on this channel, across all clones
    pub fn dropped(&self) -> u64 { self.dropped.load(Ordering::Relaxed) }
}
