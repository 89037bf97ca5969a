//! Topic and store-key constants
//!
//! Centralized registry for the pub/sub topic suffixes, reserved store keys,
//! and wire tokens shared between the validator and remote sync.

/// Pub/sub topic suffixes, joined to the configured prefix as `<prefix>/<suffix>`
pub mod topic {
    /// authority -> node: `"register"` switches to RegisterForward, anything else to Normal
    pub const MODE: &str = "mode";
    /// authority -> node: `cardKey|label|beaconId`
    pub const REGISTER: &str = "register";
    /// authority -> node: `"clear_all"`
    pub const COMMAND: &str = "command";
    /// node -> authority: card id (`04 A1 B2 C3`) forwarded in RegisterForward
    pub const CARD: &str = "card";
    /// node -> authority: attendance outcome payload
    pub const ATTENDANCE: &str = "attendance";

    /// Topics the node subscribes to after every (re)connect
    pub const INBOUND: &[&str] = &[MODE, REGISTER, COMMAND];
}

/// Reserved store keys. Card keys are upper-case hex, these are lower-case.
pub mod keys {
    pub const KEY_LIST: &str = "uid_list";
    pub const COUNT: &str = "count";
    pub const COUNTER_PREFIX: &str = "cnt_";
    pub const KEY_LIST_SEPARATOR: char = ';';
}

/// Payload tokens
pub mod wire {
    pub const FIELD_SEPARATOR: char = '|';
    pub const MODE_REGISTER: &str = "register";
    pub const CLEAR_ALL: &str = "clear_all";
    pub const UNKNOWN_LABEL: &str = "Unknown";
    pub const NO_TIMESTAMP: &str = "N/A";
}

/// Fully qualified topic names for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self { prefix: prefix.trim_end_matches('/').to_string() }
    }

    pub fn full(&self, suffix: &str) -> String {
        format!("{}/{}", self.prefix, suffix)
    }

    /// Strip the prefix from an inbound topic, `None` when it belongs elsewhere
    pub fn suffix<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic.strip_prefix(self.prefix.as_str())?.strip_prefix('/')
    }

    pub fn inbound(&self) -> Vec<String> {
        topic::INBOUND.iter().map(|s| self.full(s)).collect()
    }
}
