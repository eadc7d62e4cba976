use std::collections::VecDeque;

use async_trait::async_trait;
use common::error::{AppError, Res};
use tokio::sync::Mutex;

use crate::transport::{Delivery, Transport};

#[derive(Default)]
struct Queue {
    ready: VecDeque<String>,
    in_flight: Vec<String>,
    acked: usize,
}

/// Process-local transport. `receive` never waits.
#[derive(Default)]
pub struct MemoryTransport {
    queue: Mutex<Queue>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages not yet received.
    pub async fn ready(&self) -> usize {
        self.queue.lock().await.ready.len()
    }

    /// Messages received but not acknowledged.
    pub async fn in_flight(&self) -> Vec<String> {
        self.queue.lock().await.in_flight.clone()
    }

    pub async fn acked(&self) -> usize {
        self.queue.lock().await.acked
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, body: String) -> Res<()> {
        self.queue.lock().await.ready.push_back(body);
        Ok(())
    }

    async fn receive(&self) -> Res<Option<Delivery>> {
        let mut queue = self.queue.lock().await;
        let Some(body) = queue.ready.pop_front() else {
            return Ok(None);
        };
        queue.in_flight.push(body.clone());
        Ok(Some(Delivery { body }))
    }

    async fn ack(&self, delivery: &Delivery) -> Res<()> {
        let mut queue = self.queue.lock().await;
        let position = queue
            .in_flight
            .iter()
            .position(|body| *body == delivery.body)
            .ok_or_else(|| AppError::NotFound("delivery is not in flight".to_string()))?;
        queue.in_flight.remove(position);
        queue.acked += 1;
        Ok(())
    }
}
