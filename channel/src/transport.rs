use async_trait::async_trait;
use common::error::Res;

/// A message taken from the queue and not yet acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub body: String,
}

/// At-least-once message queue. A received message stays owned by the
/// consumer until it is acknowledged; unacknowledged messages are delivered
/// again after a restart.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, body: String) -> Res<()>;

    /// Next message, or `None` when none arrived within the transport's
    /// polling window.
    async fn receive(&self) -> Res<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> Res<()>;
}
