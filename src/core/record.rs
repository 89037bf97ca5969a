//! Identity records and their pipe-delimited storage encoding.
//!
//! Records are parsed once at the store boundary. Nothing downstream of
//! [`RecordLayout::decode`] ever sees the encoded string.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::topics::{keys, wire};

/// Canonical store key: whitespace stripped, upper-cased.
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Human form of a canonical key, a space every two characters (`04A1B2` -> `04 A1 B2`).
pub fn display_from_key(key: &str) -> String {
    key.chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One registered card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub key: String,
    pub display_id: String,
    pub owner_label: String,
    pub owner_name: String,
    pub expected_beacon_id: String,
    pub scan_count: u32,
}

impl IdentityRecord {
    /// Fresh registration with `scan_count = 0`
    pub fn new(
        card: &str,
        owner_label: impl Into<String>,
        owner_name: impl Into<String>,
        expected_beacon_id: impl Into<String>,
    ) -> Self {
        let key = normalize_key(card);
        Self {
            display_id: display_from_key(&key),
            key,
            owner_label: owner_label.into().trim().to_string(),
            owner_name: owner_name.into().trim().to_string(),
            expected_beacon_id: expected_beacon_id.into().trim().to_string(),
            scan_count: 0,
        }
    }

    pub fn with_scan_count(mut self, scan_count: u32) -> Self {
        self.scan_count = scan_count;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("scan count '{0}' is not a number")]
    BadCount(String),
    #[error("{0} must not contain '|'")]
    Separator(&'static str),
}

/// How a record maps onto string values in the key-value store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordLayout {
    /// `label|ownerName|expectedBeaconId|scanCount` under the card key
    #[default]
    Combined,
    /// `label|expectedBeaconId` under the card key, count under `cnt_<label>`
    Split,
}

impl RecordLayout {
    pub fn counter_key(label: &str) -> String {
        format!("{}{}", keys::COUNTER_PREFIX, label)
    }

    /// Refuse free-text fields that would shift the fields after them.
    /// The split layout's beacon id is the trailing field and may hold anything.
    pub fn check(&self, record: &IdentityRecord) -> Result<(), RecordError> {
        let fields: &[(&'static str, &str)] = match self {
            RecordLayout::Combined => &[
                ("label", &record.owner_label),
                ("owner name", &record.owner_name),
                ("beacon", &record.expected_beacon_id),
            ],
            RecordLayout::Split => &[("label", &record.owner_label)],
        };
        match fields.iter().find(|(_, value)| value.contains(wire::FIELD_SEPARATOR)) {
            Some((name, _)) => Err(RecordError::Separator(name)),
            None => Ok(()),
        }
    }

    pub fn encode(&self, record: &IdentityRecord) -> Result<String, RecordError> {
        self.check(record)?;
        let sep = wire::FIELD_SEPARATOR;
        Ok(match self {
            RecordLayout::Combined => format!(
                "{}{sep}{}{sep}{}{sep}{}",
                record.owner_label, record.owner_name, record.expected_beacon_id, record.scan_count
            ),
            RecordLayout::Split => format!("{}{sep}{}", record.owner_label, record.expected_beacon_id),
        })
    }

    /// Decode a stored value. `counter` is the `cnt_<label>` value for the split layout.
    pub fn decode(
        &self,
        key: &str,
        value: &str,
        counter: Option<&str>,
    ) -> Result<IdentityRecord, RecordError> {
        let mut fields = value.split(wire::FIELD_SEPARATOR);
        let label = required(fields.next(), "label")?;
        let (name, beacon, count) = match self {
            RecordLayout::Combined => {
                let name = fields.next().unwrap_or("").trim().to_string();
                let beacon = required(fields.next(), "beacon")?;
                (name, beacon, fields.next())
            }
            RecordLayout::Split => {
                // everything after the label is the beacon id
                let rest: Vec<&str> = fields.collect();
                let beacon = required(Some(rest.join("|").as_str()), "beacon")?;
                (String::new(), beacon, counter)
            }
        };

        let key = normalize_key(key);
        Ok(IdentityRecord {
            display_id: display_from_key(&key),
            key,
            owner_label: label,
            owner_name: name,
            expected_beacon_id: beacon,
            scan_count: parse_count(count)?,
        })
    }
}

fn required(field: Option<&str>, name: &'static str) -> Result<String, RecordError> {
    match field.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(RecordError::MissingField(name)),
    }
}

/// Absent counts default to 0, present-but-garbage counts are corruption.
fn parse_count(field: Option<&str>) -> Result<u32, RecordError> {
    match field.map(str::trim) {
        None | Some("") => Ok(0),
        Some(v) => v.parse().map_err(|_| RecordError::BadCount(v.to_string())),
    }
}
