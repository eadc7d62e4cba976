use std::sync::Arc;

use async_trait::async_trait;
use channel::{CancelSubscription, Command, CommandHandler, StartSubscription};
use common::error::Res;

use crate::services::sub::SubscriptionService;

/// Routes channel commands to the subscription service.
pub struct SubscriptionHandlers {
    service: Arc<SubscriptionService>,
}

impl SubscriptionHandlers {
    pub fn new(service: Arc<SubscriptionService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CommandHandler for SubscriptionHandlers {
    async fn handle(&self, command: Command) -> Res<()> {
        match command {
            Command::Start(StartSubscription { user_id }) => {
                self.service.start(user_id).await?;
                Ok(())
            }
            Command::Cancel(CancelSubscription {
                subscription_id,
                user_id,
            }) => self.service.cancel(subscription_id, user_id).await,
        }
    }
}
