//! Token reader driver seam.
//!
//! The reader is polled without blocking. After a successful read the caller
//! must `halt()` the reader before it reports another card.

use std::sync::mpsc;

use crate::core::record::normalize_key;

/// Raw card UID as read from the antenna
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToken {
    pub uid: Vec<u8>,
}

impl RawToken {
    pub fn new(uid: impl Into<Vec<u8>>) -> Self {
        Self { uid: uid.into() }
    }

    /// Parse `"04 A1 B2 C3"` or `"04a1b2c3"`
    pub fn from_hex(text: &str) -> Option<Self> {
        let compact = normalize_key(text);
        if compact.is_empty() {
            return None;
        }
        hex::decode(compact).ok().map(Self::new)
    }

    /// Upper-case hex pairs separated by spaces
    pub fn display_id(&self) -> String {
        self.uid
            .iter()
            .map(|b| hex::encode_upper([*b]))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Canonical store key
    pub fn key(&self) -> String {
        hex::encode_upper(&self.uid)
    }
}

pub trait TokenReader: Send {
    fn try_read_token(&mut self) -> Option<RawToken>;
    /// Acknowledge the last read so the next card can be reported
    fn halt(&mut self);
}

/// Reader fed from a channel of taps
pub struct SimulatedReader {
    taps: mpsc::Receiver<RawToken>,
    awaiting_halt: bool,
}

/// Producer side of a [`SimulatedReader`]
#[derive(Clone)]
pub struct TapHandle {
    tx: mpsc::Sender<RawToken>,
}

impl TapHandle {
    /// Present a card. Returns false once the reader is gone.
    pub fn tap(&self, token: RawToken) -> bool {
        self.tx.send(token).is_ok()
    }
}

impl SimulatedReader {
    pub fn new() -> (Self, TapHandle) {
        let (tx, taps) = mpsc::channel();
        (Self { taps, awaiting_halt: false }, TapHandle { tx })
    }
}

impl TokenReader for SimulatedReader {
    fn try_read_token(&mut self) -> Option<RawToken> {
        if self.awaiting_halt {
            return None;
        }
        let token = self.taps.try_recv().ok()?;
        self.awaiting_halt = true;
        Some(token)
    }

    fn halt(&mut self) {
        self.awaiting_halt = false;
    }
}
