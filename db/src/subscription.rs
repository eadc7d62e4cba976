use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{dtos::subscription::SubscriptionCreateRequest, models::subscription::Subscription};

pub async fn get_subscription_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: Uuid,
) -> Res<Subscription> {
    sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("subscription {}", id)))
}

/// Same as `get_subscription_by_id` but locks the row until the surrounding
/// transaction ends.
pub async fn get_subscription_for_update<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: Uuid,
) -> Res<Subscription> {
    sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("subscription {}", id)))
}

pub async fn get_subscriptions_by_user_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_subscriptions<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
) -> Res<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions ORDER BY created_at")
        .fetch_all(executor)
        .await
        .map_err(AppError::from)
}

pub async fn insert_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: SubscriptionCreateRequest,
) -> Res<Subscription> {
    sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions (user_id, price, features, activations, activated_at, expires_at, created_at, updated_at)
        VALUES ($1, $2, $3, 1, $4, $5, $4, $4)
        RETURNING *
        "#,
    )
    .bind(data.user_id)
    .bind(data.price)
    .bind(&data.features)
    .bind(data.activated_at)
    .bind(data.expires_at)
    .fetch_one(executor)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Conflict(
            format!("subscription already started: user_id={}", data.user_id),
        ),
        e => AppError::from(e),
    })
}

/// Replaces every mutable column of the stored subscription.
pub async fn update_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription: &Subscription,
) -> Res<()> {
    let result = sqlx::query(
        r#"
        UPDATE subscriptions
        SET price = $2, features = $3, activations = $4, activated_at = $5, expires_at = $6,
            canceled = $7, canceled_at = $8, disabled = $9, disabled_at = $10, updated_at = $11
        WHERE id = $1
        "#,
    )
    .bind(subscription.id)
    .bind(subscription.price)
    .bind(&subscription.features)
    .bind(subscription.activations)
    .bind(subscription.activated_at)
    .bind(subscription.expires_at)
    .bind(subscription.canceled)
    .bind(subscription.canceled_at)
    .bind(subscription.disabled)
    .bind(subscription.disabled_at)
    .bind(subscription.updated_at)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("subscription {}", subscription.id)));
    }
    Ok(())
}
