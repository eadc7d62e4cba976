use std::sync::Arc;

use async_trait::async_trait;
use common::env_config::WorkflowConfig;
use workflow::{
    ActivityOptions, RetryPolicy, SignalRecord, Wake, Workflow, WorkflowContext, WorkflowError,
};

use crate::{
    errors::INSUFFICIENT_FUNDS, models::state::SubscriptionState,
    services::activities::Activities,
};

pub const WORKFLOW_NAME: &str = "subscription";
pub const CANCEL_SIGNAL: &str = "cancel";

const CHARGE: &str = "charge";
const DISABLE: &str = "disable";

/// Renews a subscription every period until it is canceled or a charge finds
/// too little balance, in which case it is disabled.
pub struct SubscriptionWorkflow {
    activities: Arc<Activities>,
    options: ActivityOptions,
}

impl SubscriptionWorkflow {
    pub fn new(activities: Arc<Activities>, config: &WorkflowConfig) -> Self {
        let retry_policy = RetryPolicy {
            initial_interval: config.activity_retry_interval,
            maximum_attempts: config.activity_max_attempts,
            ..RetryPolicy::default()
        }
        .with_non_retryable(INSUFFICIENT_FUNDS);

        Self {
            activities,
            options: ActivityOptions {
                start_to_close_timeout: config.activity_timeout,
                retry_policy,
            },
        }
    }
}

fn apply_cancel(state: &mut SubscriptionState, signal: &SignalRecord) {
    state.canceled = true;
    state.canceled_at.get_or_insert(signal.sent_at);
}

#[async_trait]
impl Workflow for SubscriptionWorkflow {
    type State = SubscriptionState;

    fn name(&self) -> &'static str {
        WORKFLOW_NAME
    }

    async fn run(
        &self,
        ctx: &mut WorkflowContext<SubscriptionState>,
        input: SubscriptionState,
    ) -> Result<SubscriptionState, WorkflowError> {
        let mut state = input;
        let id = state.id;
        ctx.set_state(&state);
        log::debug!("subscription workflow started: id={}", id);

        loop {
            match ctx.await_signal_or_timer(state.expiration()).await? {
                Wake::Signal(signal) if signal.name == CANCEL_SIGNAL => {
                    apply_cancel(&mut state, &signal);
                    ctx.set_state(&state);
                    break;
                }
                Wake::Signal(signal) => {
                    log::warn!("unknown signal ignored: id={}, signal={}", id, signal.name);
                    continue;
                }
                Wake::Timer => {}
            }

            log::debug!(
                "subscription expired: id={}, expires_at={}",
                id,
                state.expires_at
            );

            // signals that arrived after the timer are only looked at once the charge is done
            let activations = state.activations;
            match ctx
                .execute_activity(CHARGE, &self.options, || {
                    self.activities.charge(id, activations)
                })
                .await
            {
                Ok(renewed) => state = renewed,
                Err(e)
                    if e
                        .activity_failure()
                        .is_some_and(|f| f.is_kind(INSUFFICIENT_FUNDS)) =>
                {
                    log::info!("subscription not renewed: id={}, {}", id, e);
                    break;
                }
                Err(e) => return Err(e),
            }

            for signal in ctx.drain_signals().await? {
                if signal.name == CANCEL_SIGNAL {
                    apply_cancel(&mut state, &signal);
                }
            }
            ctx.set_state(&state);

            if state.canceled {
                break;
            }
        }

        if !state.canceled {
            state = ctx
                .execute_activity(DISABLE, &self.options, || self.activities.disable(id))
                .await?;
            ctx.set_state(&state);
        }

        log::debug!(
            "subscription workflow finished: id={}, canceled={}, disabled={}",
            id,
            state.canceled,
            state.disabled
        );
        Ok(state)
    }
}
