//! Scan Correlator
//!
//! Runs one timed radio scan and reduces the observation stream to the single
//! strongest candidate above the signal threshold.
//!
//! ```text
//! correlate(window)
//!     │
//!     ├── fresh CandidateSlot (owned by this invocation)
//!     │
//!     ├── radio.begin_scan(window, sink = slot)
//!     │       └── driver context: slot.observation_received(obs)
//!     │                 └── replace best iff strength > best && strength > threshold
//!     │
//!     └── window closes → read slot → Correlation
//! ```
//!
//! The slot has its own lock, independent of the store guard, so a driver
//! callback never waits on store traffic.

mod radio;

pub use radio::{Advertisement, RadioScanner, SimulatedRadio};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AtlasError, AtlasResult};

/// Strength of the "nothing seen" sentinel, below any real threshold
pub const NO_SIGNAL: i32 = i32::MIN;

/// Extra time granted to a driver past the nominal window before giving up on it
const SCAN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub beacon_id: String,
    pub signal_strength: i32,
}

/// Result of one scan window. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub beacon_id: Option<String>,
    pub signal_strength: i32,
    pub found: bool,
}

impl Correlation {
    pub fn none() -> Self {
        Self { beacon_id: None, signal_strength: NO_SIGNAL, found: false }
    }

    pub fn found(beacon_id: impl Into<String>, signal_strength: i32) -> Self {
        Self { beacon_id: Some(beacon_id.into()), signal_strength, found: true }
    }
}

impl Default for Correlation {
    fn default() -> Self { Self::none() }
}

/// Receives observations from the radio driver
pub trait ObservationSink: Send + Sync {
    fn observation_received(&self, observation: Observation);
}

/// Best-so-far candidate for a single scan window
pub struct CandidateSlot {
    best: Mutex<Correlation>,
    threshold: i32,
    lock_timeout: Duration,
    seen: AtomicU64,
    dropped: AtomicU64,
}

impl CandidateSlot {
    pub fn new(threshold: i32, lock_timeout: Duration) -> Self {
        Self {
            best: Mutex::new(Correlation::none()),
            threshold,
            lock_timeout,
            seen: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn read(&self, timeout: Duration) -> Option<Correlation> {
        self.best.try_lock_for(timeout).map(|best| best.clone())
    }

    pub fn seen(&self) -> u64 { self.seen.load(Ordering::Relaxed) }
    pub fn dropped(&self) -> u64 { self.dropped.load(Ordering::Relaxed) }
}

impl ObservationSink for CandidateSlot {
    fn observation_received(&self, observation: Observation) {
        self.seen.fetch_add(1, Ordering::Relaxed);
        let Some(mut best) = self.best.try_lock_for(self.lock_timeout) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(beacon = %observation.beacon_id, "candidate slot busy, observation dropped");
            return;
        };
        if observation.signal_strength > best.signal_strength
            && observation.signal_strength > self.threshold
        {
            *best = Correlation::found(observation.beacon_id, observation.signal_strength);
        }
    }
}

pub struct ScanCorrelator {
    radio: Arc<dyn RadioScanner>,
    threshold: i32,
    active: bool,
    observation_lock_timeout: Duration,
    read_lock_timeout: Duration,
    exclusive: tokio::sync::Mutex<()>,
    dropped: AtomicU64,
}

impl ScanCorrelator {
    pub fn new(radio: Arc<dyn RadioScanner>, threshold: i32) -> Self {
        Self {
            radio,
            threshold,
            active: true,
            observation_lock_timeout: Duration::from_millis(100),
            read_lock_timeout: Duration::from_millis(500),
            exclusive: tokio::sync::Mutex::new(()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn with_active_scan(mut self, active: bool) -> Self { self.active = active; self }

    pub fn threshold(&self) -> i32 { self.threshold }

    /// Observations lost to slot contention, across all scans
    pub fn dropped_observations(&self) -> u64 { self.dropped.load(Ordering::Relaxed) }

    /// Run one scan window and return the strongest eligible observation.
    ///
    /// A second concurrent call fails with `GuardTimeout` rather than sharing
    /// the radio. Driver failures degrade to whatever was collected.
    pub async fn correlate(&self, window: Duration) -> AtlasResult<Correlation> {
        let _exclusive = self
            .exclusive
            .try_lock()
            .map_err(|_| AtlasError::GuardTimeout { guard: "scan" })?;

        let slot = Arc::new(CandidateSlot::new(self.threshold, self.observation_lock_timeout));
        debug!(window_ms = window.as_millis() as u64, threshold = self.threshold, "scan started");

        let sink: Arc<dyn ObservationSink> = slot.clone();
        match tokio::time::timeout(window + SCAN_GRACE, self.radio.begin_scan(window, self.active, sink)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "radio scan failed"),
            Err(_) => warn!("radio scan overran its window"),
        }
        self.radio.clear_results();
        self.dropped.fetch_add(slot.dropped(), Ordering::Relaxed);

        let result = slot.read(self.read_lock_timeout).unwrap_or_else(|| {
            warn!("candidate slot unavailable after scan");
            Correlation::none()
        });
        debug!(seen = slot.seen(), found = result.found, beacon = ?result.beacon_id, strength = result.signal_strength, "scan finished");
        Ok(result)
    }
}
