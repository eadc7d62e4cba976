//! In-memory implementations of the storage traits, for tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use common::error::{AppError, Res};
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    dtos::subscription::SubscriptionCreateRequest,
    models::subscription::Subscription,
    repo::{Ledger, Mutation, SubscriptionRepository, validate_amount},
};

#[derive(Default)]
pub struct MemorySubscriptionRepository {
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
}

impl MemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for MemorySubscriptionRepository {
    async fn create(&self, data: SubscriptionCreateRequest) -> Res<Subscription> {
        let mut subscriptions = self.subscriptions.write().await;

        if let Some(active) = subscriptions
            .values()
            .find(|s| s.user_id == data.user_id && s.is_active())
        {
            return Err(AppError::Conflict(format!(
                "subscription already started: subscription_id={}, user_id={}",
                active.id, active.user_id
            )));
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            price: data.price,
            features: data.features,
            activations: 1,
            activated_at: data.activated_at,
            expires_at: data.expires_at,
            canceled: false,
            canceled_at: None,
            disabled: false,
            disabled_at: None,
            created_at: data.activated_at,
            updated_at: data.activated_at,
        };
        subscriptions.insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn update(&self, subscription: &Subscription) -> Res<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let stored = subscriptions
            .get_mut(&subscription.id)
            .ok_or_else(|| AppError::NotFound(format!("subscription {}", subscription.id)))?;

        // id, owner and creation time are fixed
        *stored = Subscription {
            id: stored.id,
            user_id: stored.user_id,
            created_at: stored.created_at,
            ..subscription.clone()
        };
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Res<Subscription> {
        self.subscriptions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("subscription {}", id)))
    }

    async fn get_by_user_id(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        let mut found: Vec<Subscription> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| (s.created_at, s.id));
        Ok(found)
    }

    async fn get_all(&self) -> Res<Vec<Subscription>> {
        let mut all: Vec<Subscription> =
            self.subscriptions.read().await.values().cloned().collect();
        all.sort_by_key(|s| (s.created_at, s.id));
        Ok(all)
    }

    async fn modify(&self, id: Uuid, mutate: Mutation) -> Res<Subscription> {
        let mut subscriptions = self.subscriptions.write().await;
        let stored = subscriptions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("subscription {}", id)))?;

        let mut updated = stored.clone();
        mutate(&mut updated)?;
        *stored = updated.clone();
        Ok(updated)
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    balances: DashMap<Uuid, i64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or overwrites) an account with the given balance.
    pub fn with_balance(self, user_id: Uuid, balance: i64) -> Self {
        self.balances.insert(user_id, balance);
        self
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_balance(&self, user_id: Uuid) -> Res<i64> {
        self.balances
            .get(&user_id)
            .map(|b| *b)
            .ok_or_else(|| AppError::NotFound(format!("account of user {}", user_id)))
    }

    async fn debit(&self, user_id: Uuid, amount: i64) -> Res<i64> {
        validate_amount(amount)?;
        let mut balance = self
            .balances
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("account of user {}", user_id)))?;

        if *balance < amount {
            return Err(AppError::InsufficientFunds(format!(
                "user_id={}, balance={}, amount={}",
                user_id, *balance, amount
            )));
        }
        *balance -= amount;
        Ok(*balance)
    }

    async fn credit(&self, user_id: Uuid, amount: i64) -> Res<i64> {
        validate_amount(amount)?;
        let mut balance = self.balances.entry(user_id).or_insert(0);
        *balance += amount;
        Ok(*balance)
    }
}
