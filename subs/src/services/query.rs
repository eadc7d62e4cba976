use common::error::Res;
use uuid::Uuid;

use crate::{models::state::SubscriptionState, services::sub::SubscriptionService};

impl SubscriptionService {
    /// Live state of a running subscription workflow, else the stored record.
    pub async fn get_subscription(&self, id: Uuid) -> Res<SubscriptionState> {
        if let Some(state) = self.engine.query(&id.to_string()) {
            return Ok(state);
        }
        Ok(self.repo.get_by_id(id).await?.into())
    }

    /// Every stored subscription, oldest first.
    pub async fn get_subscriptions(&self) -> Res<Vec<SubscriptionState>> {
        let subscriptions = self.repo.get_all().await?;
        Ok(subscriptions.into_iter().map(SubscriptionState::from).collect())
    }
}
