//! Validator worker
//!
//! Sole consumer of both channels and sole writer of the store. Each cycle
//! takes at most one command and one token; when both are ready the command
//! runs first.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::context::PipelineContext;
use super::events::{Command, CommandEvent, CommandOrigin, OperatingMode, PipelineEvent, TokenEvent};
use crate::core::record::{IdentityRecord, RecordLayout};
use crate::core::table::render_table;
use crate::core::topics::{topic, wire};
use crate::engine::ValidationEngine;
use crate::error::{AtlasError, AtlasResult};
use crate::transport::{AttendancePayload, RemoteEnrollment, SharedTransport};

pub struct Validator {
    ctx: Arc<PipelineContext>,
    engine: ValidationEngine,
    tokens: mpsc::Receiver<TokenEvent>,
    commands: mpsc::Receiver<CommandEvent>,
    transport: Option<Arc<SharedTransport>>,
}

impl Validator {
    pub fn new(
        ctx: Arc<PipelineContext>,
        engine: ValidationEngine,
        tokens: mpsc::Receiver<TokenEvent>,
        commands: mpsc::Receiver<CommandEvent>,
        transport: Option<Arc<SharedTransport>>,
    ) -> Self {
        Self { ctx, engine, tokens, commands, transport }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            policy = self.engine.policy().as_str(),
            threshold = self.engine.correlator().threshold(),
            "validator started"
        );
        loop {
            let (command, token) = tokio::select! {
                _ = shutdown.recv() => break,
                ready = self.next_cycle() => ready,
            };
            if let Some(command) = command {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = self.handle_command(command) => {}
                }
            }
            if let Some(token) = token {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = self.handle_token(token) => {}
                }
            }
        }
        info!("validator stopped");
    }

    /// Wait up to the receive timeout for either channel, then pick up
    /// whatever else became ready in the same cycle.
    async fn next_cycle(&mut self) -> (Option<CommandEvent>, Option<TokenEvent>) {
        let mut command = self.commands.try_recv().ok();
        let mut token = self.tokens.try_recv().ok();
        if command.is_none() && token.is_none() {
            tokio::select! {
                Some(c) = self.commands.recv() => command = Some(c),
                Some(t) = self.tokens.recv() => token = Some(t),
                _ = tokio::time::sleep(self.ctx.config.receive_timeout) => return (None, None),
            }
            if command.is_none() {
                command = self.commands.try_recv().ok();
            }
            if token.is_none() {
                token = self.tokens.try_recv().ok();
            }
        }
        (command, token)
    }

    async fn handle_token(&mut self, event: TokenEvent) {
        match self.ctx.mode() {
            OperatingMode::RegisterForward => self.forward(event).await,
            OperatingMode::Normal => self.validate(event).await,
        }
    }

    /// RegisterForward: relay the card id upstream, never touch the store
    async fn forward(&self, event: TokenEvent) {
        let delivered = match &self.transport {
            Some(transport) => match transport.publish(&self.ctx.topics.full(topic::CARD), &event.display_id).await {
                Ok(()) => true,
                Err(e) => {
                    debug!(key = %event.key, error = %e, "card forward skipped");
                    false
                }
            },
            None => {
                warn!(key = %event.key, "register mode without upstream, card not forwarded");
                false
            }
        };
        info!(key = %event.key, delivered, "card forwarded for registration");
        self.ctx.emit(PipelineEvent::Forwarded { key: event.key, delivered });
    }

    async fn validate(&self, event: TokenEvent) {
        let validation = {
            let mut store = match self.ctx.lock_store().await {
                Ok(store) => store,
                Err(e) => return self.skipped(e),
            };
            match self.engine.validate(&mut store, &event.key).await {
                Ok(validation) => validation,
                Err(e) => {
                    warn!(key = %event.key, error = %e, "validation failed");
                    return self.skipped(e);
                }
            }
        };

        if let Some(transport) = &self.transport {
            let label = validation.record.as_ref().map_or(wire::UNKNOWN_LABEL, |r| r.owner_label.as_str());
            let payload =
                AttendancePayload::from_outcome(&event.display_id, label, &validation.outcome, self.ctx.clock.timestamp());
            if let Err(e) = transport.publish(&self.ctx.topics.full(topic::ATTENDANCE), &payload.encode()).await {
                debug!(key = %validation.key, error = %e, "attendance publish skipped");
            }
        }

        self.ctx.emit(PipelineEvent::Validated {
            key: validation.key,
            display_id: event.display_id,
            outcome: validation.outcome,
            record: validation.record,
        });
    }

    async fn handle_command(&mut self, event: CommandEvent) {
        debug!(command = event.command.name(), origin = ?event.origin, "command received");
        let result = match event.command {
            Command::Register => self.register_interactive().await,
            Command::List => self.list().await,
            Command::Clear => self.confirm_clear().await,
            Command::SetMode(mode) => {
                self.ctx.set_mode(mode);
                Ok(())
            }
            Command::ClearAll => self.clear(event.origin).await,
            Command::Enroll(enrollment) => self.enroll(enrollment).await,
        };
        if let Err(e) = result {
            if !matches!(e, AtlasError::GuardTimeout { .. }) {
                warn!(error = %e, "command failed");
            }
            self.skipped(e);
        }
    }

    /// REGISTER: next card, then label, name and beacon from the console
    async fn register_interactive(&mut self) -> AtlasResult<()> {
        let ctx = self.ctx.clone();
        let config = &ctx.config;

        info!(wait_s = config.register_card_wait.as_secs(), "registration started, waiting for card");
        ctx.emit(PipelineEvent::Prompt("Tap the card to register".into()));
        let card = match tokio::time::timeout(config.register_card_wait, self.tokens.recv()).await {
            Ok(Some(card)) => card,
            _ => return Ok(self.abandon("no card presented")),
        };

        let label = match ctx.ask(&format!("Label for card {}", card.display_id), config.input_deadline).await {
            Ok(label) if !label.is_empty() => label,
            Ok(_) => return Ok(self.abandon("label is required")),
            Err(e) => return Ok(self.abandon(&e.to_string())),
        };
        let name = match ctx.ask("Owner name", config.input_deadline).await {
            Ok(name) => name,
            Err(e) => return Ok(self.abandon(&e.to_string())),
        };
        let beacon = match ctx.ask("Beacon identifier", config.input_deadline).await {
            Ok(beacon) if !beacon.is_empty() => beacon,
            Ok(_) => return Ok(self.abandon("beacon identifier is required")),
            Err(e) => return Ok(self.abandon(&e.to_string())),
        };

        let record = {
            let mut store = ctx.lock_store().await?;
            let record = IdentityRecord::new(&card.key, label, name, beacon);
            if let Err(e) = store.layout().check(&record) {
                return Ok(self.abandon(&e.to_string()));
            }
            let starting_count = store.starting_count(&record.owner_label)?;
            let record = record.with_scan_count(starting_count);
            store.put(&record)?;
            record
        };
        info!(key = %record.key, label = %record.owner_label, beacon = %record.expected_beacon_id, "card registered");
        ctx.emit(PipelineEvent::Registered { record, origin: CommandOrigin::Console });
        Ok(())
    }

    fn abandon(&self, reason: &str) {
        info!(reason, "registration abandoned");
        self.ctx.emit(PipelineEvent::RegistrationAbandoned { reason: reason.to_string() });
    }

    async fn list(&self) -> AtlasResult<()> {
        let records = self.ctx.lock_store().await?.records()?;
        let table = render_table(&records);
        info!(total = records.len(), "registration table listed");
        self.ctx.emit(PipelineEvent::Listing { table, total: records.len() });
        Ok(())
    }

    /// CLEAR needs Y/YES before the deadline
    async fn confirm_clear(&self) -> AtlasResult<()> {
        let answer = self
            .ctx
            .ask("Erase every record? Type Y or YES to confirm", self.ctx.config.clear_confirm_deadline)
            .await;
        match answer {
            Ok(answer) if matches!(answer.to_ascii_uppercase().as_str(), "Y" | "YES") => {
                self.clear(CommandOrigin::Console).await
            }
            _ => {
                info!("clear cancelled");
                self.ctx.emit(PipelineEvent::ClearCancelled);
                Ok(())
            }
        }
    }

    async fn clear(&self, origin: CommandOrigin) -> AtlasResult<()> {
        self.ctx.lock_store().await?.clear()?;
        warn!(origin = ?origin, "store cleared");
        self.ctx.emit(PipelineEvent::Cleared { origin });
        Ok(())
    }

    /// Remote registration. Re-enrolling under the same label keeps the count;
    /// split-layout counters are shared by every card under the label.
    async fn enroll(&self, enrollment: RemoteEnrollment) -> AtlasResult<()> {
        let record = {
            let mut store = self.ctx.lock_store().await?;
            let scan_count = match store.layout() {
                RecordLayout::Split => store.starting_count(&enrollment.label)?,
                RecordLayout::Combined => match store.get(&enrollment.key) {
                    Ok(previous) => previous
                        .filter(|p| p.owner_label == enrollment.label)
                        .map_or(0, |p| p.scan_count),
                    Err(AtlasError::StoreCorruption { .. }) => 0,
                    Err(e) => return Err(e),
                },
            };
            let record = IdentityRecord::new(&enrollment.key, enrollment.label, "", enrollment.beacon_id)
                .with_scan_count(scan_count);
            store.put(&record)?;
            record
        };
        info!(key = %record.key, label = %record.owner_label, scan_count = record.scan_count, "card enrolled remotely");
        self.ctx.emit(PipelineEvent::Registered { record, origin: CommandOrigin::Remote });
        Ok(())
    }

    fn skipped(&self, error: AtlasError) {
        self.ctx.emit(PipelineEvent::Skipped { reason: error.to_string() });
    }
}
