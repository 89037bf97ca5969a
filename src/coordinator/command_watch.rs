//! Command-Watch worker: console lines → prompt answers or command events.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use super::channel::EventSender;
use super::context::PipelineContext;
use super::events::{Command, CommandEvent};
use crate::error::AtlasError;

/// Line-oriented administrative input
#[async_trait]
pub trait LineSource: Send {
    /// Next line, `None` once the source is exhausted
    async fn next_line(&mut self) -> Option<String>;
}

pub struct StdinLines {
    lines: Lines<BufReader<Stdin>>,
}

impl Default for StdinLines {
    fn default() -> Self { Self::new() }
}

impl StdinLines {
    pub fn new() -> Self {
        Self { lines: BufReader::new(tokio::io::stdin()).lines() }
    }
}

#[async_trait]
impl LineSource for StdinLines {
    async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "console read failed");
                None
            }
        }
    }
}

/// Console fed from a channel, for tests and embedding
pub struct ChannelLines {
    rx: mpsc::Receiver<String>,
}

impl ChannelLines {
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { rx }, tx)
    }
}

#[async_trait]
impl LineSource for ChannelLines {
    async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

pub struct CommandWatch {
    source: Box<dyn LineSource>,
    commands: EventSender<CommandEvent>,
    ctx: Arc<PipelineContext>,
}

impl CommandWatch {
    pub fn new(source: Box<dyn LineSource>, commands: EventSender<CommandEvent>, ctx: Arc<PipelineContext>) -> Self {
        Self { source, commands, ctx }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("command watch started");
        loop {
            let line = tokio::select! {
                _ = shutdown.recv() => break,
                line = self.source.next_line() => line,
            };
            let Some(line) = line else {
                info!("console closed");
                break;
            };
            if !self.handle_line(&line).await {
                break;
            }
        }
        info!("command watch stopped");
    }

    /// False once the command channel is gone
    async fn handle_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }
        if self.ctx.prompts.offer(line) {
            return true;
        }
        let Some(command) = Command::parse(line) else {
            warn!(line, "unknown command (REGISTER, LIST, CLEAR, SET_MODE(REGISTER|NORMAL))");
            return true;
        };
        !matches!(
            self.commands.send(CommandEvent::console(command)).await,
            Err(AtlasError::ChannelClosed { .. })
        )
    }
}
