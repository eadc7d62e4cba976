use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub price: i64,
    pub features: Vec<String>,
    pub activations: i32,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub canceled: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub disabled: bool,
    pub disabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Neither canceled nor disabled.
    pub fn is_active(&self) -> bool {
        !self.canceled && !self.disabled
    }
}
