//! Validation Engine
//!
//! Decides accept / fraud / unregistered for one presented card.
//!
//! # Decision order
//!
//! | Step | Condition | Result |
//! |------|-----------|--------|
//! | 1 | no valid record for the key | `RejectedUnregistered`, no scan |
//! | 2 | scan for the configured window | `Correlation` |
//! | 3 | found and beacon matches (equality, or label substring under `LabelFallback`) | corroborated |
//! | 4 | corroborated | `scan_count += 1`, persist, `Accepted` |
//! | 5 | otherwise | `RejectedFraud` |
//!
//! Rejections never touch the store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::record::{normalize_key, IdentityRecord};
use crate::error::{AtlasError, AtlasResult};
use crate::scan::{Correlation, ScanCorrelator};
use crate::store::IdentityStore;

/// How an observed beacon id is matched against a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Case-insensitive equality with the registered beacon id only
    Strict,
    /// Equality, or the observed id contains the owner label
    #[default]
    LabelFallback,
}

impl MatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPolicy::Strict => "strict",
            MatchPolicy::LabelFallback => "label",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" | "exact" => Some(MatchPolicy::Strict),
            "label" | "fallback" | "substring" => Some(MatchPolicy::LabelFallback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    CheckIn,
    CheckOut,
}

impl AttendanceStatus {
    /// Odd counts check in, even counts check out
    pub fn from_scan_count(scan_count: u32) -> Self {
        if scan_count % 2 == 1 { AttendanceStatus::CheckIn } else { AttendanceStatus::CheckOut }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::CheckIn => "CHECK_IN",
            AttendanceStatus::CheckOut => "CHECK_OUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accepted { scan_count: u32, status: AttendanceStatus, signal_strength: i32 },
    RejectedFraud,
    RejectedUnregistered,
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }

    /// The rejection as an error value, for callers that propagate
    pub fn rejection(&self, key: &str) -> Option<AtlasError> {
        match self {
            Outcome::Accepted { .. } => None,
            Outcome::RejectedFraud => Some(AtlasError::FraudSuspected { key: key.to_string() }),
            Outcome::RejectedUnregistered => Some(AtlasError::Unregistered { key: key.to_string() }),
        }
    }
}

/// Does this scan corroborate this record?
pub fn corroborates(record: &IdentityRecord, correlation: &Correlation, policy: MatchPolicy) -> bool {
    if !correlation.found {
        return false;
    }
    let Some(observed) = correlation.beacon_id.as_deref() else {
        return false;
    };
    let observed = observed.to_ascii_uppercase();
    if observed == record.expected_beacon_id.to_ascii_uppercase() {
        return true;
    }
    let label = record.owner_label.trim().to_ascii_uppercase();
    policy == MatchPolicy::LabelFallback && !label.is_empty() && observed.contains(&label)
}

/// Outcome of one full validation, with what was seen along the way
#[derive(Debug, Clone)]
pub struct Validation {
    pub key: String,
    pub outcome: Outcome,
    /// Record after the decision (incremented on accept)
    pub record: Option<IdentityRecord>,
    pub correlation: Option<Correlation>,
}

pub struct ValidationEngine {
    correlator: Arc<ScanCorrelator>,
    policy: MatchPolicy,
    window: Duration,
}

impl ValidationEngine {
    pub fn new(correlator: Arc<ScanCorrelator>, policy: MatchPolicy, window: Duration) -> Self {
        Self { correlator, policy, window }
    }

    pub fn policy(&self) -> MatchPolicy { self.policy }

    pub fn correlator(&self) -> &ScanCorrelator { &self.correlator }

    /// Pure decision. `Accepted` carries the count the record will have once persisted.
    pub fn decide(
        &self,
        presented_key: &str,
        record: Option<&IdentityRecord>,
        correlation: &Correlation,
    ) -> Outcome {
        let Some(record) = record.filter(|r| r.key == normalize_key(presented_key)) else {
            return Outcome::RejectedUnregistered;
        };
        if !corroborates(record, correlation, self.policy) {
            return Outcome::RejectedFraud;
        }
        let scan_count = record.scan_count.saturating_add(1);
        Outcome::Accepted {
            scan_count,
            status: AttendanceStatus::from_scan_count(scan_count),
            signal_strength: correlation.signal_strength,
        }
    }

    /// Lookup, scan, decide, persist. Caller holds the store guard throughout.
    pub async fn validate(&self, store: &mut IdentityStore, presented_key: &str) -> AtlasResult<Validation> {
        let key = normalize_key(presented_key);
        let record = match store.get(&key) {
            Ok(record) => record,
            Err(AtlasError::StoreCorruption { reason, .. }) => {
                warn!(key = %key, reason = %reason, "stored record unusable, treating as unregistered");
                None
            }
            Err(e) => return Err(e),
        };

        let Some(mut record) = record else {
            info!(key = %key, "card not registered");
            return Ok(Validation { key, outcome: Outcome::RejectedUnregistered, record: None, correlation: None });
        };

        let correlation = self.correlator.correlate(self.window).await?;
        let outcome = self.decide(&key, Some(&record), &correlation);

        match &outcome {
            Outcome::Accepted { scan_count, status, signal_strength } => {
                record.scan_count = *scan_count;
                store.put(&record)?;
                info!(key = %key, label = %record.owner_label, scan_count, status = status.as_str(), strength = signal_strength, "attendance accepted");
            }
            Outcome::RejectedFraud => {
                warn!(key = %key, label = %record.owner_label, observed = ?correlation.beacon_id, "card presented without its beacon");
            }
            Outcome::RejectedUnregistered => {}
        }

        Ok(Validation { key, outcome, record: Some(record), correlation: Some(correlation) })
    }
}
