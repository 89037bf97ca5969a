//! Remote-Sync worker (distributed variant)
//!
//! ```text
//! every sync_interval:
//!   ├── disconnected and back-off elapsed → connect + subscribe mode/register/command
//!   └── drain inbound → CommandEvent (remote) → command channel
//! ```
//!
//! Outbound publication happens in the validator through the same
//! [`SharedTransport`] guard.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::channel::EventSender;
use super::context::PipelineContext;
use super::events::{Command, CommandEvent, OperatingMode};
use crate::core::topics::topic;
use crate::error::AtlasError;
use crate::runtime::pause;
use crate::transport::{payload, RemoteEnrollment, SharedTransport, TransportMessage};

pub struct RemoteSync {
    ctx: Arc<PipelineContext>,
    transport: Arc<SharedTransport>,
    commands: EventSender<CommandEvent>,
    last_failure: Option<Instant>,
}

impl RemoteSync {
    pub fn new(ctx: Arc<PipelineContext>, transport: Arc<SharedTransport>, commands: EventSender<CommandEvent>) -> Self {
        Self { ctx, transport, commands, last_failure: None }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(prefix = %self.ctx.config.topic_prefix, "remote sync started");
        let inbound = self.ctx.topics.inbound();
        loop {
            self.maintain(&inbound).await;
            if !self.drain().await {
                break;
            }
            if !pause(self.ctx.config.sync_interval, &mut shutdown).await {
                break;
            }
        }
        info!("remote sync stopped");
    }

    async fn maintain(&mut self, inbound: &[String]) {
        let backoff = self.ctx.config.reconnect_backoff;
        if self.last_failure.is_some_and(|at| at.elapsed() < backoff) {
            return;
        }
        match self.transport.maintain(inbound).await {
            Ok(true) => {
                info!("remote authority connected");
                self.last_failure = None;
            }
            Ok(false) => {}
            Err(AtlasError::GuardTimeout { .. }) => warn!("transport guard busy, maintenance skipped"),
            Err(e) => {
                debug!(error = %e, retry_s = backoff.as_secs(), "remote authority unreachable");
                self.last_failure = Some(Instant::now());
            }
        }
    }

    /// False once the command channel is gone
    async fn drain(&self) -> bool {
        let messages = match self.transport.drain().await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "inbound drain skipped");
                return true;
            }
        };
        for message in messages {
            let Some(command) = self.decode(&message) else { continue };
            if let Err(AtlasError::ChannelClosed { .. }) = self.commands.send(CommandEvent::remote(command)).await {
                return false;
            }
        }
        true
    }

    fn decode(&self, message: &TransportMessage) -> Option<Command> {
        let suffix = self.ctx.topics.suffix(&message.topic)?;
        match suffix {
            topic::MODE => Some(Command::SetMode(if payload::is_register_mode(&message.payload) {
                OperatingMode::RegisterForward
            } else {
                OperatingMode::Normal
            })),
            topic::REGISTER => {
                let enrollment = RemoteEnrollment::parse(&message.payload);
                if enrollment.is_none() {
                    warn!(payload = %message.payload, "malformed register message ignored");
                }
                enrollment.map(Command::Enroll)
            }
            topic::COMMAND if payload::is_clear_all(&message.payload) => Some(Command::ClearAll),
            topic::COMMAND => {
                warn!(payload = %message.payload, "unknown remote command ignored");
                None
            }
            _ => None,
        }
    }
}
