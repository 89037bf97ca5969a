//! Shared pipeline context, handed to each worker at construction.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{info, warn};

use super::config::NodeConfig;
use super::events::{OperatingMode, PipelineEvent};
use super::prompt::PromptSlot;
use crate::clock::WallClock;
use crate::core::topics::Topics;
use crate::error::{AtlasError, AtlasResult};
use crate::store::IdentityStore;

const EVENT_CAPACITY: usize = 64;

/// Process-wide operating mode, written only by the validator
#[derive(Debug, Default)]
pub struct ModeFlag(AtomicU8);

impl ModeFlag {
    pub fn get(&self) -> OperatingMode {
        match self.0.load(Ordering::SeqCst) {
            1 => OperatingMode::RegisterForward,
            _ => OperatingMode::Normal,
        }
    }

    /// Returns the previous mode
    pub fn set(&self, mode: OperatingMode) -> OperatingMode {
        let raw = match mode {
            OperatingMode::Normal => 0,
            OperatingMode::RegisterForward => 1,
        };
        match self.0.swap(raw, Ordering::SeqCst) {
            1 => OperatingMode::RegisterForward,
            _ => OperatingMode::Normal,
        }
    }
}

pub struct PipelineContext {
    pub config: NodeConfig,
    pub topics: Topics,
    pub clock: Arc<dyn WallClock>,
    pub prompts: PromptSlot,
    store: Mutex<IdentityStore>,
    mode: ModeFlag,
    events: broadcast::Sender<PipelineEvent>,
}

impl PipelineContext {
    pub fn new(config: NodeConfig, store: IdentityStore, clock: Arc<dyn WallClock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            topics: Topics::new(config.topic_prefix.clone()),
            config,
            clock,
            prompts: PromptSlot::new(),
            store: Mutex::new(store),
            mode: ModeFlag::default(),
            events,
        }
    }

    /// Acquire the store guard within the configured timeout
    pub async fn lock_store(&self) -> AtlasResult<MutexGuard<'_, IdentityStore>> {
        tokio::time::timeout(self.config.store_guard_timeout, self.store.lock())
            .await
            .map_err(|_| {
                warn!(timeout_ms = self.config.store_guard_timeout.as_millis() as u64, "store guard busy, cycle skipped");
                AtlasError::GuardTimeout { guard: "store" }
            })
    }

    pub fn mode(&self) -> OperatingMode { self.mode.get() }

    pub fn set_mode(&self, mode: OperatingMode) {
        let previous = self.mode.set(mode);
        if previous != mode {
            info!(from = previous.as_str(), to = mode.as_str(), "operating mode changed");
        }
        self.emit(PipelineEvent::ModeChanged(mode));
    }

    /// Open a console prompt, announce it, and wait for the answer
    pub async fn ask(&self, prompt: &str, deadline: Duration) -> AtlasResult<String> {
        let answer = self.prompts.open();
        self.emit(PipelineEvent::Prompt(prompt.to_string()));
        self.prompts.wait(answer, prompt, deadline).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Broadcast to observers. No observers is fine.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }
}
