use std::sync::Arc;

use common::error::Res;

use crate::{command::Command, transport::Transport};

#[derive(Clone)]
pub struct Producer {
    transport: Arc<dyn Transport>,
}

impl Producer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, command: &Command) -> Res<()> {
        let body = command.to_envelope()?.to_body()?;
        self.transport.publish(body).await?;
        log::debug!("command published: type={}", command.kind());
        Ok(())
    }
}
