//! Task Coordinator
//!
//! Owns the channels, guards and worker lifecycles. No business logic lives
//! here.
//!
//! ```text
//!  reader ──► [token-watch] ──► token channel ──┐
//!                                               ├──► [validator] ──► store (guard)
//!  console ─► [command-watch] ─► command chan ──┤        │
//!                                  ▲            │        ├──► scan correlator ──► radio
//!  broker ◄─► [remote-sync] ───────┘            │        └──► transport (guard) ──► broker
//!                                               │
//!                                  PipelineEvent broadcast ──► observers
//! ```
//!
//! | Worker | Present when | Suspends on |
//! |--------|--------------|-------------|
//! | token-watch | always | poll interval, debounce |
//! | command-watch | a console is supplied | next console line |
//! | validator | always | receive timeout, store guard, scan window, prompts |
//! | remote-sync | `config.remote_sync` | sync interval, transport guard |

pub mod channel;
pub mod command_watch;
pub mod config;
pub mod context;
pub mod events;
pub mod prompt;
pub mod remote_sync;
pub mod token_watch;
pub mod validator;

pub use channel::EventSender;
pub use command_watch::{ChannelLines, LineSource, StdinLines};
pub use config::{NodeConfig, Variant};
pub use context::PipelineContext;
pub use events::{Command, CommandEvent, CommandOrigin, OperatingMode, PipelineEvent, TokenEvent};

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::clock::{SystemClock, WallClock};
use crate::engine::ValidationEngine;
use crate::error::{AtlasError, AtlasResult};
use crate::reader::TokenReader;
use crate::runtime::Shutdown;
use crate::scan::{RadioScanner, ScanCorrelator};
use crate::store::{FileBackend, IdentityStore};
use crate::transport::{SharedTransport, Transport};

/// External collaborators for one pipeline
pub struct Drivers {
    pub reader: Box<dyn TokenReader>,
    pub radio: Arc<dyn RadioScanner>,
    pub console: Option<Box<dyn LineSource>>,
    pub transport: Option<Box<dyn Transport>>,
    pub clock: Arc<dyn WallClock>,
}

impl Drivers {
    pub fn new(reader: Box<dyn TokenReader>, radio: Arc<dyn RadioScanner>) -> Self {
        Self { reader, radio, console: None, transport: None, clock: Arc::new(SystemClock::default()) }
    }
    pub fn with_console(mut self, console: Box<dyn LineSource>) -> Self { self.console = Some(console); self }
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self { self.transport = Some(transport); self }
    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self { self.clock = clock; self }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    pub tokens_dropped: u64,
    pub commands_dropped: u64,
    pub observations_dropped: u64,
    pub publishes_skipped: u64,
}

pub struct Coordinator {
    ctx: Arc<PipelineContext>,
    correlator: Arc<ScanCorrelator>,
    tokens: EventSender<TokenEvent>,
    commands: EventSender<CommandEvent>,
    transport: Option<Arc<SharedTransport>>,
    shutdown: Shutdown,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

/// Durable store for `config.app` under `config.root`
pub fn open_store(config: &NodeConfig) -> AtlasResult<IdentityStore> {
    let backend = FileBackend::open_app(&config.app, config.root.as_deref())?;
    info!(path = %backend.path().display(), layout = ?config.layout, "store opened");
    Ok(IdentityStore::new(Box::new(backend), config.layout))
}

impl Coordinator {
    /// Build channels and guards, then spawn the workers. Any failure here is fatal.
    pub fn start(config: NodeConfig, store: IdentityStore, drivers: Drivers, shutdown: &Shutdown) -> AtlasResult<Self> {
        config.validate().map_err(|e| AtlasError::Startup(e.to_string()))?;
        tokio::runtime::Handle::try_current().map_err(|_| AtlasError::Startup("no async runtime".into()))?;
        if config.remote_sync && drivers.transport.is_none() {
            return Err(AtlasError::Startup("remote sync enabled without a transport".into()));
        }

        let (tokens, token_rx) = channel::bounded("token", config.token_capacity, config.enqueue_wait);
        let (commands, command_rx) = channel::bounded("command", config.command_capacity, config.enqueue_wait);

        let correlator =
            Arc::new(ScanCorrelator::new(drivers.radio, config.rssi_threshold).with_active_scan(config.active_scan));
        let engine = ValidationEngine::new(correlator.clone(), config.match_policy, config.scan_window);
        let transport = drivers
            .transport
            .map(|t| Arc::new(SharedTransport::new(t, config.transport_guard_timeout)));

        let variant = config.variant;
        let sync_enabled = config.remote_sync;
        let ctx = Arc::new(PipelineContext::new(config, store, drivers.clock));

        let mut workers = Vec::new();
        workers.push((
            "validator",
            validator::Validator::new(ctx.clone(), engine, token_rx, command_rx, transport.clone())
                .spawn(shutdown.subscribe()),
        ));
        workers.push((
            "token-watch",
            token_watch::TokenWatch::new(drivers.reader, tokens.clone(), ctx.config.poll_interval, ctx.config.debounce)
                .spawn(shutdown.subscribe()),
        ));
        if let Some(console) = drivers.console {
            workers.push((
                "command-watch",
                command_watch::CommandWatch::new(console, commands.clone(), ctx.clone()).spawn(shutdown.subscribe()),
            ));
        }
        if let (true, Some(transport)) = (sync_enabled, &transport) {
            workers.push((
                "remote-sync",
                remote_sync::RemoteSync::new(ctx.clone(), transport.clone(), commands.clone())
                    .spawn(shutdown.subscribe()),
            ));
        }

        info!(variant = variant.as_str(), workers = workers.len(), "pipeline started");
        Ok(Self { ctx, correlator, tokens, commands, transport, shutdown: shutdown.clone(), workers })
    }

    pub fn context(&self) -> &Arc<PipelineContext> { &self.ctx }

    pub fn mode(&self) -> OperatingMode { self.ctx.mode() }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> { self.ctx.subscribe() }

    /// Inject a command as if it came from the console
    pub async fn submit(&self, command: Command) -> AtlasResult<()> {
        self.commands.send(CommandEvent::console(command)).await
    }

    /// Answer the pending prompt directly
    pub fn answer(&self, line: &str) -> bool { self.ctx.prompts.offer(line) }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            tokens_dropped: self.tokens.dropped(),
            commands_dropped: self.commands.dropped(),
            observations_dropped: self.correlator.dropped_observations(),
            publishes_skipped: self.transport.as_ref().map_or(0, |t| t.skipped()),
        }
    }

    /// Signal every worker and wait for them to exit
    pub async fn shutdown(self) {
        self.shutdown.trigger().await;
        for (name, handle) in self.workers {
            if let Err(e) = handle.await {
                tracing::error!(worker = name, error = %e, "worker ended abnormally");
            }
        }
        info!("pipeline stopped");
    }
}
