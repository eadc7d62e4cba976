use std::sync::Arc;

use common::{
    clock::Clock,
    env_config::{BillingConfig, WorkflowConfig},
    error::{AppError, Res},
};
use db::{
    dtos::subscription::SubscriptionCreateRequest,
    repo::{Ledger, SubscriptionRepository},
};
use serde_json::json;
use uuid::Uuid;
use workflow::{Engine, EngineOptions, HistoryStore};

use crate::{
    models::state::SubscriptionState,
    rules::renewal_period,
    services::{
        activities::Activities,
        workflow::{CANCEL_SIGNAL, SubscriptionWorkflow},
    },
};

/// Entry point for starting, canceling and reading subscriptions.
pub struct SubscriptionService {
    pub(crate) engine: Engine<SubscriptionWorkflow>,
    pub(crate) repo: Arc<dyn SubscriptionRepository>,
    ledger: Arc<dyn Ledger>,
    billing: BillingConfig,
    clock: Clock,
}

impl SubscriptionService {
    /// Wires the workflow engine and its activities over the given stores.
    pub fn new(
        repo: Arc<dyn SubscriptionRepository>,
        ledger: Arc<dyn Ledger>,
        history: Arc<dyn HistoryStore>,
        billing: BillingConfig,
        workflow: &WorkflowConfig,
        clock: Clock,
    ) -> Self {
        let activities = Activities::new(repo.clone(), ledger.clone(), billing.clone(), clock);
        let engine = Engine::new(
            SubscriptionWorkflow::new(Arc::new(activities), workflow),
            history,
            clock,
            EngineOptions {
                execution_timeout: workflow.execution_timeout,
            },
        );

        Self {
            engine,
            repo,
            ledger,
            billing,
            clock,
        }
    }

    pub fn engine(&self) -> &Engine<SubscriptionWorkflow> {
        &self.engine
    }

    /// Resumes the workflows of subscriptions that were running when the
    /// process stopped.
    pub async fn recover(&self) -> Res<usize> {
        self.engine.recover().await
    }

    /// Creates a subscription for `user_id` and starts its workflow. The
    /// first period is not charged.
    pub async fn start(&self, user_id: Uuid) -> Res<SubscriptionState> {
        let balance = self.ledger.get_balance(user_id).await?;
        if balance < self.billing.price {
            return Err(AppError::InsufficientFunds(format!(
                "insufficient funds to subscribe: user_id={}, balance={}, price={}",
                user_id, balance, self.billing.price
            )));
        }

        let subscriptions = self.repo.get_by_user_id(user_id).await?;
        if let Some(active) = subscriptions.iter().find(|s| s.is_active()) {
            return Err(AppError::Conflict(format!(
                "subscription already started: subscription_id={}, user_id={}",
                active.id, active.user_id
            )));
        }

        let now = self.clock.now();
        let subscription = self
            .repo
            .create(SubscriptionCreateRequest {
                user_id,
                price: self.billing.price,
                features: self.billing.features.clone(),
                activated_at: now,
                expires_at: now + renewal_period(&self.billing)?,
            })
            .await?;
        let state = SubscriptionState::from(subscription);

        if let Err(e) = self.engine.start(&state.id.to_string(), state.clone()).await {
            log::error!(
                "failed to start workflow, disabling subscription: id={}, error={}",
                state.id,
                e
            );
            self.repo
                .modify(
                    state.id,
                    Box::new(move |s| {
                        s.disabled = true;
                        s.disabled_at = Some(now);
                        s.updated_at = now;
                        Ok(())
                    }),
                )
                .await?;
            return Err(e);
        }

        log::info!(
            "subscription started: id={}, user_id={}, expires_at={}",
            state.id,
            user_id,
            state.expires_at
        );
        Ok(state)
    }

    /// Cancels a subscription on behalf of its owner. Canceling twice is a
    /// no-op.
    pub async fn cancel(&self, subscription_id: Uuid, user_id: Uuid) -> Res<()> {
        let subscription = self.repo.get_by_id(subscription_id).await?;
        if subscription.user_id != user_id {
            return Err(AppError::Forbidden(format!(
                "invalid user to cancel subscription: user_id={}, subscription_id={}",
                user_id, subscription_id
            )));
        }
        if subscription.canceled {
            log::debug!("subscription already canceled: id={}", subscription_id);
            return Ok(());
        }

        let now = self.clock.now();
        self.repo
            .modify(
                subscription_id,
                Box::new(move |s| {
                    if !s.canceled {
                        s.canceled = true;
                        s.canceled_at = Some(now);
                        s.updated_at = now;
                    }
                    Ok(())
                }),
            )
            .await?;

        match self
            .engine
            .signal(
                &subscription_id.to_string(),
                CANCEL_SIGNAL,
                json!({ "user_id": user_id }),
            )
            .await
        {
            Ok(()) => {}
            Err(AppError::NotFound(_)) => {
                log::debug!("no running workflow to signal: id={}", subscription_id)
            }
            Err(e) => return Err(e),
        }

        log::info!(
            "subscription canceled: id={}, user_id={}",
            subscription_id,
            user_id
        );
        Ok(())
    }
}
