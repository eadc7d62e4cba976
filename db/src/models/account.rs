use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Account {
    pub user_id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}
