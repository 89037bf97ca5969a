//! Clock - wall time for attendance stamps
//!
//! Attendance payloads carry a `YYYY-MM-DD HH:MM:SS` stamp in the node's
//! configured UTC offset. The clock is a collaborator so tests can pin it.
//!
//! | Clock | Source | Use Case |
//! |-------|--------|----------|
//! | `SystemClock` | `chrono::Utc::now()` + offset | Production |
//! | `FixedClock` | constant string | Tests |

use chrono::{FixedOffset, Utc};

use crate::core::topics::wire;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub trait WallClock: Send + Sync {
    /// Formatted local time, or `N/A` when the time is unknown
    fn timestamp(&self) -> String;
}

/// System time shifted by a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: Option<FixedOffset>,
}

impl SystemClock {
    pub fn new(utc_offset_secs: i32) -> Self {
        Self { offset: FixedOffset::east_opt(utc_offset_secs) }
    }
}

impl Default for SystemClock {
    fn default() -> Self { Self::new(0) }
}

impl WallClock for SystemClock {
    fn timestamp(&self) -> String {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string(),
            None => wire::NO_TIMESTAMP.to_string(),
        }
    }
}

/// Always reports the same stamp
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl WallClock for FixedClock {
    fn timestamp(&self) -> String { self.0.clone() }
}
