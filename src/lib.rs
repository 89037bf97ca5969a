//! Atlas: dual-factor attendance gate. A card tap counts only when the
//! card's paired beacon is heard during the same scan window.
//!
//! # Architecture
//!
//! ```text
//! Coordinator (entry point)
//!   │
//!   ├── token-watch ──── TokenReader (card antenna)
//!   ├── command-watch ── LineSource (console)
//!   ├── remote-sync ──── SharedTransport (pub/sub authority, distributed only)
//!   │
//!   └── validator
//!         ├── IdentityStore (durable, behind the store guard)
//!         └── ValidationEngine
//!               └── ScanCorrelator ── RadioScanner (beacon scan)
//! ```
//!
//! # Outcomes
//!
//! | Outcome | When | Store |
//! |---------|------|-------|
//! | `Accepted` | registered card, its beacon heard above threshold | `scan_count += 1` |
//! | `RejectedFraud` | registered card, beacon not heard | untouched |
//! | `RejectedUnregistered` | unknown card (no scan is run) | untouched |
//!
//! Odd counts check in, even counts check out.
//!
//! # Variants
//!
//! - `standalone` - console administration, `label|name|beacon|count` records,
//!   label-substring beacon matching
//! - `distributed` - remote authority over pub/sub, `label|beacon` records with
//!   `cnt_<label>` counters, strict beacon matching
//!
//! # Usage
//!
//! ```ignore
//! use atlas::{Coordinator, Drivers, NodeConfig, Shutdown, SimulatedRadio, SimulatedReader};
//!
//! let config = NodeConfig::standalone().with_app("gate-a");
//! let store = atlas::coordinator::open_store(&config)?;
//! let (reader, taps) = SimulatedReader::new();
//! let drivers = Drivers::new(Box::new(reader), Arc::new(SimulatedRadio::new()));
//!
//! let shutdown = Shutdown::new();
//! let pipeline = Coordinator::start(config, store, drivers, &shutdown)?;
//! let mut events = pipeline.subscribe();
//! ```

pub mod clock;
pub mod coordinator;
pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod reader;
pub mod runtime;
pub mod scan;
pub mod store;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================
pub use clock::{FixedClock, SystemClock, WallClock};
pub use coordinator::{
    Command, CommandOrigin, Coordinator, Drivers, NodeConfig, OperatingMode, PipelineEvent, PipelineStats, Variant,
};
pub use crate::core::{IdentityRecord, RecordLayout};
pub use engine::{AttendanceStatus, MatchPolicy, Outcome, ValidationEngine};
pub use error::{AtlasError, AtlasResult};
pub use reader::{RawToken, SimulatedReader, TapHandle, TokenReader};
pub use runtime::{install_signal_handlers, Shutdown};
pub use scan::{Advertisement, Correlation, RadioScanner, ScanCorrelator, SimulatedRadio};
pub use store::{FileBackend, IdentityStore, MemoryBackend};
pub use transport::{InMemoryBroker, SharedTransport, Transport};
