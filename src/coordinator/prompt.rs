//! Console prompt routing.
//!
//! While a prompt is pending the next console line answers it instead of
//! being parsed as a command.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::info;

use crate::error::{AtlasError, AtlasResult};

#[derive(Default)]
pub struct PromptSlot {
    pending: Mutex<Option<oneshot::Sender<String>>>,
}

impl PromptSlot {
    pub fn new() -> Self { Self::default() }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Deliver a line to the pending prompt. False when nothing is waiting.
    pub fn offer(&self, line: &str) -> bool {
        match self.pending.lock().take() {
            Some(tx) => tx.send(line.trim().to_string()).is_ok(),
            None => false,
        }
    }

    /// Install a pending prompt. Lines offered from now on answer it.
    pub fn open(&self) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);
        rx
    }

    /// Wait on an opened prompt until `deadline`
    pub async fn wait(&self, answer: oneshot::Receiver<String>, prompt: &str, deadline: Duration) -> AtlasResult<String> {
        match tokio::time::timeout(deadline, answer).await {
            Ok(Ok(answer)) => Ok(answer),
            _ => {
                self.pending.lock().take();
                info!(prompt, "prompt abandoned, no input before deadline");
                Err(AtlasError::InputTimeout { prompt: prompt.to_string() })
            }
        }
    }

    pub async fn ask(&self, prompt: &str, deadline: Duration) -> AtlasResult<String> {
        let answer = self.open();
        self.wait(answer, prompt, deadline).await
    }
}
