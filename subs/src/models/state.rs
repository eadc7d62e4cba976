use std::time::Duration;

use chrono::{DateTime, Utc};
use db::models::subscription::Subscription;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Working copy of a subscription carried through its workflow and returned
/// by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
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

impl SubscriptionState {
    /// Length of the current period, zero if it is inverted.
    pub fn expiration(&self) -> Duration {
        (self.expires_at - self.activated_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn has_expired(&self, at: DateTime<Utc>) -> bool {
        self.expires_at < at
    }

    pub fn is_active(&self) -> bool {
        !self.canceled && !self.disabled
    }
}

impl From<Subscription> for SubscriptionState {
    fn from(s: Subscription) -> Self {
        SubscriptionState {
            id: s.id,
            user_id: s.user_id,
            price: s.price,
            features: s.features,
            activations: s.activations,
            activated_at: s.activated_at,
            expires_at: s.expires_at,
            canceled: s.canceled,
            canceled_at: s.canceled_at,
            disabled: s.disabled,
            disabled_at: s.disabled_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

impl From<SubscriptionState> for Subscription {
    fn from(s: SubscriptionState) -> Self {
        Subscription {
            id: s.id,
            user_id: s.user_id,
            price: s.price,
            features: s.features,
            activations: s.activations,
            activated_at: s.activated_at,
            expires_at: s.expires_at,
            canceled: s.canceled,
            canceled_at: s.canceled_at,
            disabled: s.disabled,
            disabled_at: s.disabled_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn subscription() -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            price: 50,
            features: vec!["uploads".into(), "downloads".into(), "api".into()],
            activations: 4,
            activated_at: now,
            expires_at: now + TimeDelta::days(30),
            canceled: true,
            canceled_at: Some(now + TimeDelta::hours(1)),
            disabled: false,
            disabled_at: None,
            created_at: now - TimeDelta::days(90),
            updated_at: now + TimeDelta::hours(1),
        }
    }

    #[test]
    fn conversion_keeps_every_field() {
        let original = subscription();
        let state = SubscriptionState::from(original.clone());

        assert_eq!(state.features, vec!["uploads", "downloads", "api"]);
        assert_eq!(Subscription::from(state), original);
    }

    #[test]
    fn expiration_is_period_length() {
        let state = SubscriptionState::from(subscription());
        assert_eq!(state.expiration(), Duration::from_secs(30 * 24 * 60 * 60));
    }

    #[test]
    fn expiration_never_negative() {
        let mut state = SubscriptionState::from(subscription());
        state.expires_at = state.activated_at - TimeDelta::seconds(1);
        assert_eq!(state.expiration(), Duration::ZERO);
    }

    #[test]
    fn has_expired_after_expiry_only() {
        let state = SubscriptionState::from(subscription());
        assert!(!state.has_expired(state.expires_at));
        assert!(state.has_expired(state.expires_at + TimeDelta::seconds(1)));
    }
}
