use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::error::Res;

use crate::{
    command::Command,
    envelope::Envelope,
    transport::Transport,
};

/// Pause after an empty receive on transports that do not block.
const IDLE: Duration = Duration::from_millis(100);

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> Res<()>;
}

pub struct Consumer {
    transport: Arc<dyn Transport>,
}

impl Consumer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Consumes messages until one is not a readable envelope. That message
    /// is left unacknowledged and its parse error returned.
    pub async fn listen(&self, handler: &dyn CommandHandler) -> Res<()> {
        log::info!("consumer listening");
        loop {
            if !self.poll(handler).await? {
                tokio::time::sleep(IDLE).await;
            }
        }
    }

    /// Handles at most one message. Returns whether one was received.
    pub async fn poll(&self, handler: &dyn CommandHandler) -> Res<bool> {
        let Some(delivery) = self.transport.receive().await? else {
            return Ok(false);
        };

        let envelope = match Envelope::parse(&delivery.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::error!("unreadable message, stopping consumer: {}", e);
                return Err(e.into());
            }
        };

        match Command::from_envelope(&envelope) {
            Ok(Some(command)) => {
                let kind = command.kind();
                match handler.handle(command).await {
                    Ok(()) => {}
                    Err(e) if e.is_transient() => {
                        log::error!("error on handle message: type={}, error={}", kind, e)
                    }
                    Err(e) => log::warn!("command rejected: type={}, reason={}", kind, e),
                }
            }
            Ok(None) => log::warn!("unhandled message: type={}", envelope.kind),
            Err(e) => log::error!(
                "error on handle message: type={}, error={}",
                envelope.kind,
                e
            ),
        }

        self.transport.ack(&delivery).await?;
        Ok(true)
    }
}
