//! Node Configuration - presets, builders and environment overlay

use std::path::PathBuf;
use std::time::Duration;

use crate::core::record::RecordLayout;
use crate::engine::MatchPolicy;
use crate::error::{AtlasError, AtlasResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Local console administration, combined record layout
    #[default]
    Standalone,
    /// Remote authority over pub/sub, split record layout
    Distributed,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Standalone => "standalone",
            Variant::Distributed => "distributed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standalone" | "local" => Some(Variant::Standalone),
            "distributed" | "slave" | "remote" => Some(Variant::Distributed),
            _ => None,
        }
    }
}

/// Node configuration. The binary builds this from the environment; tests build it directly.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub app: String,
    pub variant: Variant,
    /// Store root, `None` for `$ATLAS_ROOT` or the platform data dir
    pub root: Option<PathBuf>,

    pub rssi_threshold: i32,
    pub scan_window: Duration,
    /// Request scan responses from advertisers
    pub active_scan: bool,
    pub match_policy: MatchPolicy,
    pub layout: RecordLayout,

    pub token_capacity: usize,
    pub command_capacity: usize,
    /// Longest a producer waits on a full channel before dropping
    pub enqueue_wait: Duration,
    /// Validator wait for either channel per cycle
    pub receive_timeout: Duration,
    pub poll_interval: Duration,
    pub debounce: Duration,

    pub store_guard_timeout: Duration,
    pub transport_guard_timeout: Duration,

    pub register_card_wait: Duration,
    pub input_deadline: Duration,
    pub clear_confirm_deadline: Duration,

    pub remote_sync: bool,
    pub topic_prefix: String,
    pub reconnect_backoff: Duration,
    pub sync_interval: Duration,

    pub utc_offset_secs: i32,
}

impl Default for NodeConfig {
    fn default() -> Self { Self::standalone() }
}

impl NodeConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }

    /// Single node with console administration
    pub fn standalone() -> Self {
        Self {
            app: "atlas".into(),
            variant: Variant::Standalone,
            root: None,
            rssi_threshold: -75,
            scan_window: Duration::from_secs(3),
            active_scan: true,
            match_policy: MatchPolicy::LabelFallback,
            layout: RecordLayout::Combined,
            token_capacity: 5,
            command_capacity: 5,
            enqueue_wait: Duration::from_millis(100),
            receive_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(100),
            debounce: Duration::from_millis(2000),
            store_guard_timeout: Duration::from_millis(2000),
            transport_guard_timeout: Duration::from_millis(1000),
            register_card_wait: Duration::from_secs(30),
            input_deadline: Duration::from_secs(60),
            clear_confirm_deadline: Duration::from_secs(10),
            remote_sync: false,
            topic_prefix: "atlas".into(),
            reconnect_backoff: Duration::from_secs(5),
            sync_interval: Duration::from_millis(50),
            utc_offset_secs: 7 * 3600,
        }
    }

    /// Slave node reporting to a remote authority
    pub fn distributed() -> Self {
        Self {
            variant: Variant::Distributed,
            rssi_threshold: -100,
            match_policy: MatchPolicy::Strict,
            layout: RecordLayout::Split,
            enqueue_wait: Duration::from_millis(200),
            receive_timeout: Duration::from_millis(200),
            debounce: Duration::from_millis(1500),
            store_guard_timeout: Duration::from_millis(1000),
            remote_sync: true,
            ..Self::standalone()
        }
    }

    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Standalone => Self::standalone(),
            Variant::Distributed => Self::distributed(),
        }
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self { self.app = app.into(); self }
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self { self.root = Some(root.into()); self }
    pub fn with_threshold(mut self, dbm: i32) -> Self { self.rssi_threshold = dbm; self }
    pub fn with_scan_window(mut self, window: Duration) -> Self { self.scan_window = window; self }
    pub fn with_active_scan(mut self, active: bool) -> Self { self.active_scan = active; self }
    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self { self.match_policy = policy; self }
    pub fn with_layout(mut self, layout: RecordLayout) -> Self { self.layout = layout; self }
    pub fn with_capacities(mut self, token: usize, command: usize) -> Self {
        self.token_capacity = token;
        self.command_capacity = command;
        self
    }
    pub fn with_debounce(mut self, debounce: Duration) -> Self { self.debounce = debounce; self }
    pub fn with_poll_interval(mut self, interval: Duration) -> Self { self.poll_interval = interval; self }
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self { self.receive_timeout = timeout; self }
    pub fn with_store_guard_timeout(mut self, timeout: Duration) -> Self { self.store_guard_timeout = timeout; self }
    pub fn with_deadlines(mut self, card_wait: Duration, input: Duration, clear_confirm: Duration) -> Self {
        self.register_card_wait = card_wait;
        self.input_deadline = input;
        self.clear_confirm_deadline = clear_confirm;
        self
    }
    pub fn with_remote_sync(mut self, enabled: bool) -> Self { self.remote_sync = enabled; self }
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self { self.topic_prefix = prefix.into(); self }
    pub fn with_reconnect(mut self, backoff: Duration, sync_interval: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self.sync_interval = sync_interval;
        self
    }
    pub fn with_utc_offset(mut self, secs: i32) -> Self { self.utc_offset_secs = secs; self }

    /// Preset chosen by `ATLAS_VARIANT`, then individual `ATLAS_*` overrides
    pub fn from_env() -> AtlasResult<Self> {
        let variant = match env("ATLAS_VARIANT") {
            Some(v) => Variant::from_str(&v).ok_or_else(|| bad("ATLAS_VARIANT", &v))?,
            None => Variant::default(),
        };
        let mut config = Self::for_variant(variant);

        if let Some(app) = env("ATLAS_APP") {
            config.app = app;
        }
        if let Some(root) = env("ATLAS_ROOT") {
            config.root = Some(PathBuf::from(root));
        }
        if let Some(v) = env("ATLAS_RSSI_THRESHOLD") {
            config.rssi_threshold = v.parse().map_err(|_| bad("ATLAS_RSSI_THRESHOLD", &v))?;
        }
        if let Some(v) = env("ATLAS_SCAN_WINDOW_MS") {
            let ms: u64 = v.parse().map_err(|_| bad("ATLAS_SCAN_WINDOW_MS", &v))?;
            config.scan_window = Duration::from_millis(ms);
        }
        if let Some(v) = env("ATLAS_MATCH") {
            config.match_policy = MatchPolicy::from_str(&v).ok_or_else(|| bad("ATLAS_MATCH", &v))?;
        }
        if let Some(prefix) = env("ATLAS_TOPIC_PREFIX") {
            config.topic_prefix = prefix;
        }
        if let Some(v) = env("ATLAS_UTC_OFFSET") {
            config.utc_offset_secs = v.parse().map_err(|_| bad("ATLAS_UTC_OFFSET", &v))?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AtlasResult<()> {
        if self.app.trim().is_empty() {
            return Err(AtlasError::Config("app name is empty".into()));
        }
        if self.token_capacity == 0 || self.command_capacity == 0 {
            return Err(AtlasError::Config("channel capacity must be at least 1".into()));
        }
        if self.scan_window.is_zero() {
            return Err(AtlasError::Config("scan window must be non-zero".into()));
        }
        if self.receive_timeout.is_zero() || self.store_guard_timeout.is_zero() {
            return Err(AtlasError::Config("timeouts must be non-zero".into()));
        }
        if self.remote_sync && self.topic_prefix.trim_matches('/').is_empty() {
            return Err(AtlasError::Config("remote sync needs a topic prefix".into()));
        }
        Ok(())
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn bad(name: &str, value: &str) -> AtlasError {
    AtlasError::Config(format!("{name}={value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_where_expected() {
        let s = NodeConfig::standalone();
        let d = NodeConfig::distributed();
        assert_eq!((s.rssi_threshold, d.rssi_threshold), (-75, -100));
        assert_eq!(s.match_policy, MatchPolicy::LabelFallback);
        assert_eq!(d.match_policy, MatchPolicy::Strict);
        assert_eq!(d.layout, RecordLayout::Split);
        assert!(d.remote_sync && !s.remote_sync);
        assert_eq!(s.scan_window, d.scan_window);
    }

    #[test]
    fn variant_parses() {
        assert_eq!(Variant::from_str(" Distributed "), Some(Variant::Distributed));
        assert_eq!(Variant::from_str("local"), Some(Variant::Standalone));
        assert_eq!(Variant::from_str("cluster"), None);
        assert_eq!(Variant::Distributed.as_str(), "distributed");
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        assert!(NodeConfig::standalone().validate().is_ok());
        let err = NodeConfig::standalone().with_capacities(0, 5).validate().unwrap_err();
        assert!(matches!(err, AtlasError::Config(_)));
        assert!(NodeConfig::new("x").with_scan_window(Duration::ZERO).validate().is_err());
    }
}
