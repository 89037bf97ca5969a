//! Radio scanner driver seam and a simulated radio.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{Observation, ObservationSink};
use crate::error::AtlasResult;

/// Short-range radio scanner. Observations are delivered to `sink` from the
/// driver's own execution context while the window is open; the future
/// resolves when the window closes.
#[async_trait]
pub trait RadioScanner: Send + Sync {
    async fn begin_scan(
        &self,
        window: Duration,
        active: bool,
        sink: Arc<dyn ObservationSink>,
    ) -> AtlasResult<()>;

    /// Drop buffered results from the previous scan
    fn clear_results(&self);
}

/// One advertisement in range. Only those with a service id are reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub service_id: Option<String>,
    pub signal_strength: i32,
}

impl Advertisement {
    pub fn service(id: impl Into<String>, signal_strength: i32) -> Self {
        Self { service_id: Some(id.into()), signal_strength }
    }

    pub fn anonymous(signal_strength: i32) -> Self {
        Self { service_id: None, signal_strength }
    }
}

/// Radio backed by a mutable set of nearby advertisers.
///
/// Each scan spreads the advertisements evenly over the window and delivers
/// them from a blocking thread, the way a vendor stack calls back from its
/// own task.
#[derive(Clone, Default)]
pub struct SimulatedRadio {
    nearby: Arc<RwLock<Vec<Advertisement>>>,
    scans: Arc<std::sync::atomic::AtomicU64>,
    passive: Arc<std::sync::atomic::AtomicU64>,
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nearby(nearby: Vec<Advertisement>) -> Self {
        Self { nearby: Arc::new(RwLock::new(nearby)), ..Self::default() }
    }

    pub async fn set_nearby(&self, nearby: Vec<Advertisement>) {
        *self.nearby.write().await = nearby;
    }

    pub async fn add(&self, advertisement: Advertisement) {
        self.nearby.write().await.push(advertisement);
    }

    pub async fn clear(&self) {
        self.nearby.write().await.clear();
    }

    /// Number of scans started
    pub fn scans(&self) -> u64 {
        self.scans.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Scans started without scan requests
    pub fn passive_scans(&self) -> u64 {
        self.passive.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl RadioScanner for SimulatedRadio {
    async fn begin_scan(
        &self,
        window: Duration,
        active: bool,
        sink: Arc<dyn ObservationSink>,
    ) -> AtlasResult<()> {
        self.scans.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if !active {
            self.passive.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        let observations: Vec<Observation> = self
            .nearby
            .read()
            .await
            .iter()
            .filter_map(|ad| {
                ad.service_id.as_ref().map(|id| Observation {
                    beacon_id: id.clone(),
                    signal_strength: ad.signal_strength,
                })
            })
            .collect();

        let spacing = window / (observations.len() as u32 + 1);
        let deliver = tokio::task::spawn_blocking(move || {
            for observation in observations {
                std::thread::sleep(spacing);
                sink.observation_received(observation);
            }
        });
        tokio::time::sleep(window).await;
        let _ = deliver.await;
        Ok(())
    }

    fn clear_results(&self) {}
}
