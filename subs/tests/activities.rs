use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use common::{
    clock::Clock,
    env_config::BillingConfig,
    error::{AppError, Res},
};
use db::{
    dtos::subscription::SubscriptionCreateRequest,
    memory::{MemoryLedger, MemorySubscriptionRepository},
    models::subscription::Subscription,
    repo::{Ledger, Mutation, SubscriptionRepository},
};
use subs::{Activities, errors::INSUFFICIENT_FUNDS};
use uuid::Uuid;

fn request(user_id: Uuid, now: DateTime<Utc>) -> SubscriptionCreateRequest {
    SubscriptionCreateRequest {
        user_id,
        price: 50,
        features: vec!["downloads".into(), "uploads".into()],
        activated_at: now,
        expires_at: now + TimeDelta::days(30),
    }
}

async fn setup(
    repo: Arc<dyn SubscriptionRepository>,
    balance: i64,
) -> (Activities, Arc<MemoryLedger>, Subscription) {
    let clock = Clock::new();
    let user_id = Uuid::new_v4();
    let ledger = Arc::new(MemoryLedger::new().with_balance(user_id, balance));
    let subscription = repo.create(request(user_id, clock.now())).await.unwrap();
    let activities = Activities::new(repo, ledger.clone(), BillingConfig::default(), clock);
    (activities, ledger, subscription)
}

#[tokio::test(start_paused = true)]
async fn charge_debits_and_starts_a_new_period() {
    let repo = Arc::new(MemorySubscriptionRepository::new());
    let (activities, ledger, subscription) = setup(repo.clone(), 90).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    let state = activities
        .charge(subscription.id, subscription.activations)
        .await
        .unwrap();

    assert_eq!(state.activations, 2);
    assert!(state.activated_at - subscription.activated_at >= TimeDelta::seconds(60));
    assert_eq!(state.expires_at, state.activated_at + TimeDelta::days(30));
    assert_eq!(ledger.get_balance(subscription.user_id).await.unwrap(), 40);
    assert_eq!(
        repo.get_by_id(subscription.id).await.unwrap(),
        Subscription::from(state)
    );
}

#[tokio::test(start_paused = true)]
async fn charge_of_a_renewed_activation_does_not_debit_again() {
    let repo = Arc::new(MemorySubscriptionRepository::new());
    let (activities, ledger, subscription) = setup(repo.clone(), 100).await;

    let renewed = activities
        .charge(subscription.id, subscription.activations)
        .await
        .unwrap();
    let again = activities
        .charge(subscription.id, subscription.activations)
        .await
        .unwrap();

    assert_eq!(renewed.activations, 2);
    assert_eq!(again, renewed);
    assert_eq!(ledger.get_balance(subscription.user_id).await.unwrap(), 50);
}

#[tokio::test(start_paused = true)]
async fn overlapping_charges_of_one_activation_debit_once() {
    let repo = Arc::new(MemorySubscriptionRepository::new());
    let (activities, ledger, subscription) = setup(repo.clone(), 100).await;

    let (first, second) = tokio::join!(
        activities.charge(subscription.id, subscription.activations),
        activities.charge(subscription.id, subscription.activations),
    );

    assert_eq!(first.unwrap().activations, 2);
    assert_eq!(second.unwrap().activations, 2);
    assert_eq!(ledger.get_balance(subscription.user_id).await.unwrap(), 50);
}

#[tokio::test(start_paused = true)]
async fn charge_without_funds_is_terminal_and_changes_nothing() {
    let repo = Arc::new(MemorySubscriptionRepository::new());
    let (activities, ledger, subscription) = setup(repo.clone(), 40).await;

    let failure = activities
        .charge(subscription.id, subscription.activations)
        .await
        .unwrap_err();

    assert!(failure.is_kind(INSUFFICIENT_FUNDS));
    assert!(failure.non_retryable);
    assert_eq!(ledger.get_balance(subscription.user_id).await.unwrap(), 40);
    assert_eq!(repo.get_by_id(subscription.id).await.unwrap(), subscription);
}

/// Repository that cannot write once a subscription exists.
struct ReadOnlyRepository(MemorySubscriptionRepository);

#[async_trait]
impl SubscriptionRepository for ReadOnlyRepository {
    async fn create(&self, data: SubscriptionCreateRequest) -> Res<Subscription> {
        self.0.create(data).await
    }

    async fn update(&self, _: &Subscription) -> Res<()> {
        Err(AppError::Internal("read only".into()))
    }

    async fn get_by_id(&self, id: Uuid) -> Res<Subscription> {
        self.0.get_by_id(id).await
    }

    async fn get_by_user_id(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        self.0.get_by_user_id(user_id).await
    }

    async fn get_all(&self) -> Res<Vec<Subscription>> {
        self.0.get_all().await
    }

    async fn modify(&self, _: Uuid, _: Mutation) -> Res<Subscription> {
        Err(AppError::Internal("read only".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn failed_renewal_refunds_the_debit() {
    let repo = Arc::new(ReadOnlyRepository(MemorySubscriptionRepository::new()));
    let (activities, ledger, subscription) = setup(repo, 90).await;

    let failure = activities
        .charge(subscription.id, subscription.activations)
        .await
        .unwrap_err();

    assert!(!failure.non_retryable);
    assert_eq!(ledger.get_balance(subscription.user_id).await.unwrap(), 90);
}

#[tokio::test(start_paused = true)]
async fn disable_twice_returns_the_same_snapshot() {
    let repo = Arc::new(MemorySubscriptionRepository::new());
    let (activities, _, subscription) = setup(repo, 90).await;

    let first = activities.disable(subscription.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;
    let second = activities.disable(subscription.id).await.unwrap();

    assert!(first.disabled);
    assert!(first.disabled_at.is_some());
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn charge_of_unknown_subscription_is_retryable() {
    let repo = Arc::new(MemorySubscriptionRepository::new());
    let (activities, _, _) = setup(repo, 90).await;

    let failure = activities.charge(Uuid::new_v4(), 1).await.unwrap_err();
    assert!(!failure.non_retryable);
    assert!(failure.is_kind("not_found"));
}
