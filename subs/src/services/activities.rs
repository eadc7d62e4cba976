use std::sync::Arc;

use common::{
    clock::Clock,
    env_config::BillingConfig,
    error::{AppError, Res},
};
use dashmap::DashMap;
use db::repo::{Ledger, SubscriptionRepository};
use tokio::sync::Mutex;
use uuid::Uuid;
use workflow::ActivityFailure;

use crate::{errors::classify, models::state::SubscriptionState, rules::renewal_period};

/// Side effects the subscription workflow delegates to.
#[derive(Clone)]
pub struct Activities {
    repo: Arc<dyn SubscriptionRepository>,
    ledger: Arc<dyn Ledger>,
    billing: BillingConfig,
    clock: Clock,
    // one charge at a time per subscription
    charging: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Activities {
    pub fn new(
        repo: Arc<dyn SubscriptionRepository>,
        ledger: Arc<dyn Ledger>,
        billing: BillingConfig,
        clock: Clock,
    ) -> Self {
        Self {
            repo,
            ledger,
            billing,
            clock,
            charging: Arc::new(DashMap::new()),
        }
    }

    /// Debits the price and starts the period that follows activation number
    /// `activations`. A subscription already past that activation is returned
    /// as stored without a second debit.
    ///
    /// The work runs on its own task, so an attempt abandoned by its timeout
    /// still finishes its debit and renewal (or refund) before the next
    /// attempt for the same subscription starts.
    pub async fn charge(
        &self,
        id: Uuid,
        activations: i32,
    ) -> Result<SubscriptionState, ActivityFailure> {
        let activities = self.clone();
        let task = tokio::spawn(async move {
            let lock = activities
                .charging
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let result = {
                let _guard = lock.lock().await;
                activities.try_charge(id, activations).await
            };
            drop(lock);
            activities
                .charging
                .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
            result
        });

        match task.await {
            Ok(result) => result.map_err(classify),
            Err(e) => Err(classify(AppError::Internal(format!(
                "charge task of subscription {} aborted: {}",
                id, e
            )))),
        }
    }

    async fn try_charge(&self, id: Uuid, activations: i32) -> Res<SubscriptionState> {
        let subscription = self.repo.get_by_id(id).await?;
        let (user_id, price) = (subscription.user_id, subscription.price);

        if subscription.activations > activations {
            log::info!(
                "subscription already charged: id={}, activations={}",
                id,
                subscription.activations
            );
            return Ok(subscription.into());
        }

        let balance = self.ledger.get_balance(user_id).await?;
        if balance < price {
            return Err(AppError::InsufficientFunds(format!(
                "user_id={}, balance={}, price={}",
                user_id, balance, price
            )));
        }

        let period = renewal_period(&self.billing)?;
        let balance = self.ledger.debit(user_id, price).await?;

        let now = self.clock.now();
        let renewed = self
            .repo
            .modify(
                id,
                Box::new(move |s| {
                    if s.activations != activations {
                        return Err(AppError::Conflict(format!(
                            "subscription renewed concurrently: id={}, activations={}",
                            s.id, s.activations
                        )));
                    }
                    s.activations += 1;
                    s.activated_at = now;
                    s.expires_at = now + period;
                    s.updated_at = now;
                    Ok(())
                }),
            )
            .await;

        match renewed {
            Ok(subscription) => {
                log::info!(
                    "subscription charged: id={}, user_id={}, price={}, balance={}, activations={}",
                    id,
                    user_id,
                    price,
                    balance,
                    subscription.activations
                );
                Ok(subscription.into())
            }
            Err(e) => {
                // the debit must not outlive a renewal that was not stored
                if let Err(refund) = self.ledger.credit(user_id, price).await {
                    log::error!(
                        "failed to refund charge: id={}, user_id={}, price={}, error={}",
                        id,
                        user_id,
                        price,
                        refund
                    );
                }
                Err(e)
            }
        }
    }

    /// Marks the subscription disabled. A second call returns the stored
    /// snapshot unchanged.
    pub async fn disable(&self, id: Uuid) -> Result<SubscriptionState, ActivityFailure> {
        let now = self.clock.now();
        let subscription = self
            .repo
            .modify(
                id,
                Box::new(move |s| {
                    if !s.disabled {
                        s.disabled = true;
                        s.disabled_at = Some(now);
                        s.updated_at = now;
                    }
                    Ok(())
                }),
            )
            .await
            .map_err(classify)?;

        log::info!("subscription disabled: id={}", id);
        Ok(subscription.into())
    }
}
