//! Typed events flowing through the pipeline channels and out to observers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::record::IdentityRecord;
use crate::engine::Outcome;
use crate::reader::RawToken;
use crate::transport::RemoteEnrollment;

/// Pending token event, consumed exactly once by the validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEvent {
    pub key: String,
    pub display_id: String,
}

impl TokenEvent {
    pub fn from_raw(token: &RawToken) -> Self {
        Self { key: token.key(), display_id: token.display_id() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    #[default]
    Normal,
    /// Tokens are relayed upstream for registration instead of validated
    RegisterForward,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Normal => "normal",
            OperatingMode::RegisterForward => "register",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" | "default" => Some(OperatingMode::Normal),
            "register" | "register_forward" | "forward" => Some(OperatingMode::RegisterForward),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive registration of the next presented card
    Register,
    /// Print the registration table
    List,
    /// Wipe the store after console confirmation
    Clear,
    SetMode(OperatingMode),
    /// Remote wipe, no confirmation
    ClearAll,
    /// Remote registration/overwrite
    Enroll(RemoteEnrollment),
}

static SET_MODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:SET_MODE\s*\(\s*([A-Z_]+)\s*\)|MODE\s+([A-Z_]+))$").expect("mode pattern")
});

impl Command {
    /// Parse one console line. Unknown lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        match line.to_ascii_uppercase().as_str() {
            "REGISTER" => return Some(Command::Register),
            "LIST" | "TABLE" => return Some(Command::List),
            "CLEAR" => return Some(Command::Clear),
            _ => {}
        }
        let caps = SET_MODE.captures(line)?;
        let arg = caps.get(1).or_else(|| caps.get(2))?;
        OperatingMode::from_str(arg.as_str()).map(Command::SetMode)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Register => "REGISTER",
            Command::List => "LIST",
            Command::Clear => "CLEAR",
            Command::SetMode(_) => "SET_MODE",
            Command::ClearAll => "CLEAR_ALL",
            Command::Enroll(_) => "ENROLL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    Console,
    Remote,
}

/// Pending command event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub command: Command,
    pub origin: CommandOrigin,
}

impl CommandEvent {
    pub fn console(command: Command) -> Self { Self { command, origin: CommandOrigin::Console } }
    pub fn remote(command: Command) -> Self { Self { command, origin: CommandOrigin::Remote } }
}

/// Everything the validator did, broadcast to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Validated {
        key: String,
        display_id: String,
        outcome: Outcome,
        record: Option<IdentityRecord>,
    },
    /// RegisterForward relay; `delivered` is false when the transport was down
    Forwarded { key: String, delivered: bool },
    Registered { record: IdentityRecord, origin: CommandOrigin },
    Listing { table: String, total: usize },
    Cleared { origin: CommandOrigin },
    ClearCancelled,
    ModeChanged(OperatingMode),
    /// Interactive step waiting for a console line
    Prompt(String),
    RegistrationAbandoned { reason: String },
    /// Event dropped or skipped. Diagnostic only.
    Skipped { reason: String },
}
