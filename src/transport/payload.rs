//! Wire payloads for the remote administrative surface.

use crate::core::record::normalize_key;
use crate::core::topics::wire;
use crate::engine::{AttendanceStatus, Outcome};

pub const STATUS_FRAUD: &str = "FRAUD";
pub const STATUS_UNREGISTERED: &str = "UNREGISTERED";

/// `cardId|label|signalStrength|acceptedFlag|timestamp|scanCount|status`,
/// where `cardId` is the spaced display form read from the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendancePayload {
    pub card_id: String,
    pub label: String,
    pub signal_strength: i32,
    pub accepted: bool,
    pub timestamp: String,
    pub scan_count: u32,
    pub status: String,
}

impl AttendancePayload {
    pub fn accepted(
        card_id: &str,
        label: &str,
        signal_strength: i32,
        timestamp: String,
        scan_count: u32,
        status: AttendanceStatus,
    ) -> Self {
        Self {
            card_id: card_id.to_string(),
            label: label.to_string(),
            signal_strength,
            accepted: true,
            timestamp,
            scan_count,
            status: status.as_str().to_string(),
        }
    }

    /// Rejections carry no identity details
    pub fn rejected(card_id: &str, timestamp: String, status: &str) -> Self {
        Self {
            card_id: card_id.to_string(),
            label: wire::UNKNOWN_LABEL.to_string(),
            signal_strength: 0,
            accepted: false,
            timestamp,
            scan_count: 0,
            status: status.to_string(),
        }
    }

    pub fn from_outcome(card_id: &str, label: &str, outcome: &Outcome, timestamp: String) -> Self {
        match outcome {
            Outcome::Accepted { scan_count, status, signal_strength } => {
                Self::accepted(card_id, label, *signal_strength, timestamp, *scan_count, *status)
            }
            Outcome::RejectedFraud => Self::rejected(card_id, timestamp, STATUS_FRAUD),
            Outcome::RejectedUnregistered => Self::rejected(card_id, timestamp, STATUS_UNREGISTERED),
        }
    }

    pub fn encode(&self) -> String {
        let sep = wire::FIELD_SEPARATOR;
        format!(
            "{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.card_id,
            self.label,
            self.signal_strength,
            u8::from(self.accepted),
            self.timestamp,
            self.scan_count,
            self.status,
        )
    }
}

/// Remote `register` message: `cardKey|label|beaconId`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEnrollment {
    pub key: String,
    pub label: String,
    pub beacon_id: String,
}

impl RemoteEnrollment {
    /// The beacon id is everything after the second separator
    pub fn parse(payload: &str) -> Option<Self> {
        let mut parts = payload.trim().splitn(3, wire::FIELD_SEPARATOR);
        let key = normalize_key(parts.next()?);
        let label = parts.next()?.trim().to_string();
        let beacon_id = parts.next()?.trim().to_string();
        if key.is_empty() || label.is_empty() || beacon_id.is_empty() {
            return None;
        }
        Some(Self { key, label, beacon_id })
    }
}

/// `mode` topic: exactly `register` selects register-forward, anything else normal
pub fn is_register_mode(payload: &str) -> bool {
    payload == wire::MODE_REGISTER
}

pub fn is_clear_all(payload: &str) -> bool {
    payload.trim() == wire::CLEAR_ALL
}
