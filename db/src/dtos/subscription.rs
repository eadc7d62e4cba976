use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct SubscriptionCreateRequest {
    pub user_id: Uuid,
    pub price: i64,
    pub features: Vec<String>,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
