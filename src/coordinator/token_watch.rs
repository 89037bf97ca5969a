//! Token-Watch worker: reader poll → token channel, with debounce.

use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::channel::EventSender;
use super::events::TokenEvent;
use crate::error::AtlasError;
use crate::reader::TokenReader;
use crate::runtime::pause;

pub struct TokenWatch {
    reader: Box<dyn TokenReader>,
    tokens: EventSender<TokenEvent>,
    poll_interval: Duration,
    debounce: Duration,
}

impl TokenWatch {
    pub fn new(reader: Box<dyn TokenReader>, tokens: EventSender<TokenEvent>, poll_interval: Duration, debounce: Duration) -> Self {
        Self { reader, tokens, poll_interval, debounce }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("token watch started");
        loop {
            let Some(token) = self.reader.try_read_token() else {
                if !pause(self.poll_interval, &mut shutdown).await { break; }
                continue;
            };
            self.reader.halt();

            let event = TokenEvent::from_raw(&token);
            debug!(key = %event.key, display = %event.display_id, "card detected");
            if let Err(AtlasError::ChannelClosed { .. }) = self.tokens.send(event).await {
                break;
            }
            // one physical tap, one event
            if !pause(self.debounce, &mut shutdown).await { break; }
        }
        info!("token watch stopped");
    }
}
