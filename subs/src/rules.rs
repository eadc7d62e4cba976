use chrono::TimeDelta;
use common::{
    env_config::BillingConfig,
    error::{AppError, Res},
};

/// Renewal period as a calendar offset.
pub fn renewal_period(billing: &BillingConfig) -> Res<TimeDelta> {
    TimeDelta::from_std(billing.renewal_period).map_err(|e| {
        AppError::Internal(format!(
            "renewal period out of range: {:?}: {}",
            billing.renewal_period, e
        ))
    })
}
