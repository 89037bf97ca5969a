//! Error taxonomy for the validation pipeline.
//!
//! Only `Startup` is fatal. Everything else degrades: the current event or
//! cycle is skipped and a diagnostic is logged.

use thiserror::Error;

pub type AtlasResult<T> = Result<T, AtlasError>;

#[derive(Debug, Error)]
pub enum AtlasError {
    /// Bounded channel stayed full past the producer's wait bound. The event is dropped.
    #[error("channel '{channel}' full, event dropped")]
    ChannelFull { channel: &'static str },

    #[error("channel '{channel}' closed")]
    ChannelClosed { channel: &'static str },

    /// Guard not acquired within its timeout. Skipped this cycle.
    #[error("timed out acquiring {guard} guard")]
    GuardTimeout { guard: &'static str },

    #[error("card {key} not registered")]
    Unregistered { key: String },

    /// Token presented without its paired beacon in range.
    #[error("card {key} presented without its beacon")]
    FraudSuspected { key: String },

    #[error("stored record for {key} is malformed: {reason}")]
    StoreCorruption { key: String, reason: String },

    /// Record refused before it reached the store
    #[error("record for {key} not stored: {reason}")]
    InvalidRecord { key: String, reason: String },

    /// Publish skipped. Delivery is at-most-once, nothing is queued.
    #[error("transport unavailable")]
    TransportUnavailable,

    #[error("no input for '{prompt}' before the deadline")]
    InputTimeout { prompt: String },

    #[error("store backend: {0}")]
    Backend(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("startup failed: {0}")]
    Startup(String),
}

impl AtlasError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AtlasError::Startup(_))
    }
}

impl From<std::io::Error> for AtlasError {
    fn from(e: std::io::Error) -> Self {
        AtlasError::Backend(format!("io: {e}"))
    }
}

impl From<serde_json::Error> for AtlasError {
    fn from(e: serde_json::Error) -> Self {
        AtlasError::Backend(format!("json: {e}"))
    }
}
