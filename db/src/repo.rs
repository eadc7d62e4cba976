use async_trait::async_trait;
use common::error::{AppError, Res};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{dtos::subscription::SubscriptionCreateRequest, models::subscription::Subscription};

/// In-place change applied by `SubscriptionRepository::modify`.
pub type Mutation = Box<dyn FnOnce(&mut Subscription) -> Res<()> + Send>;

/// Durable storage of subscription records.
///
/// Implementations enforce the one-active-subscription-per-user invariant on
/// `create` and make `modify` atomic per subscription.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, data: SubscriptionCreateRequest) -> Res<Subscription>;

    /// Full replace of the mutable fields.
    async fn update(&self, subscription: &Subscription) -> Res<()>;

    async fn get_by_id(&self, id: Uuid) -> Res<Subscription>;

    async fn get_by_user_id(&self, user_id: Uuid) -> Res<Vec<Subscription>>;

    async fn get_all(&self) -> Res<Vec<Subscription>>;

    /// Loads, mutates and persists one subscription without interleaving
    /// another writer. Nothing is written when `mutate` fails.
    async fn modify(&self, id: Uuid, mutate: Mutation) -> Res<Subscription>;
}

/// Balance tracking per user.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_balance(&self, user_id: Uuid) -> Res<i64>;

    /// Fails with `InsufficientFunds` instead of going negative.
    async fn debit(&self, user_id: Uuid, amount: i64) -> Res<i64>;

    async fn credit(&self, user_id: Uuid, amount: i64) -> Res<i64>;
}

pub(crate) fn validate_amount(amount: i64) -> Res<()> {
    if amount <= 0 {
        return Err(AppError::BadRequest(format!("invalid amount: {}", amount)));
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgSubscriptionRepository {
    pool: PgPool,
}

impl PgSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn create(&self, data: SubscriptionCreateRequest) -> Res<Subscription> {
        let subscription = crate::subscription::insert_subscription(&self.pool, data).await?;
        log::info!(
            "subscription created: id={}, user_id={}",
            subscription.id,
            subscription.user_id
        );
        Ok(subscription)
    }

    async fn update(&self, subscription: &Subscription) -> Res<()> {
        crate::subscription::update_subscription(&self.pool, subscription).await?;
        log::debug!("subscription updated: id={}", subscription.id);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Res<Subscription> {
        crate::subscription::get_subscription_by_id(&self.pool, id).await
    }

    async fn get_by_user_id(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        crate::subscription::get_subscriptions_by_user_id(&self.pool, user_id).await
    }

    async fn get_all(&self) -> Res<Vec<Subscription>> {
        crate::subscription::get_subscriptions(&self.pool).await
    }

    async fn modify(&self, id: Uuid, mutate: Mutation) -> Res<Subscription> {
        let mut tx = self.pool.begin().await?;
        let mut subscription = crate::subscription::get_subscription_for_update(&mut *tx, id).await?;
        mutate(&mut subscription)?;
        crate::subscription::update_subscription(&mut *tx, &subscription).await?;
        tx.commit().await?;
        log::debug!("subscription updated: id={}", subscription.id);
        Ok(subscription)
    }
}

#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn get_balance(&self, user_id: Uuid) -> Res<i64> {
        let account = crate::account::get_account_by_user_id(&self.pool, user_id).await?;
        Ok(account.balance)
    }

    async fn debit(&self, user_id: Uuid, amount: i64) -> Res<i64> {
        validate_amount(amount)?;
        match crate::account::debit_account(&self.pool, user_id, amount).await? {
            Some(balance) => Ok(balance),
            None => {
                // distinguishes a missing account from a short one
                let balance = self.get_balance(user_id).await?;
                Err(AppError::InsufficientFunds(format!(
                    "user_id={}, balance={}, amount={}",
                    user_id, balance, amount
                )))
            }
        }
    }

    async fn credit(&self, user_id: Uuid, amount: i64) -> Res<i64> {
        validate_amount(amount)?;
        crate::account::credit_account(&self.pool, user_id, amount).await
    }
}
