use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::account::Account;

pub async fn get_account_by_user_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Account> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("account of user {}", user_id)))
}

/// Subtracts `amount` only when the balance covers it.
/// Returns the new balance, or `None` when the account is missing or short.
pub async fn debit_account<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    amount: i64,
) -> Res<Option<i64>> {
    sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE accounts SET balance = balance - $2, updated_at = now()
        WHERE user_id = $1 AND balance >= $2
        RETURNING balance
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Adds `amount`, opening the account on first top-up.
pub async fn credit_account<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    amount: i64,
) -> Res<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO accounts (user_id, balance) VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET balance = accounts.balance + EXCLUDED.balance, updated_at = now()
        RETURNING balance
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}
