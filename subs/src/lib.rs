//! Subscription lifecycle: one durable workflow per subscription that charges
//! on every renewal until the subscription is canceled or can no longer be
//! paid for.

pub mod errors;
pub mod handlers;
pub mod rules;

pub mod models {
    pub mod state;
}

pub mod services {
    pub mod activities;
    pub mod query;
    pub mod sub;
    pub mod workflow;
}

pub use handlers::SubscriptionHandlers;
pub use models::state::SubscriptionState;
pub use services::{activities::Activities, sub::SubscriptionService, workflow::SubscriptionWorkflow};
