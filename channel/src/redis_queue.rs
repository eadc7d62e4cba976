use async_trait::async_trait;
use common::error::Res;
use redis::AsyncCommands;

use crate::transport::{Delivery, Transport};

/// Seconds a `receive` blocks waiting for a message.
const BLOCK_SECS: f64 = 1.0;

/// Reliable queue on two Redis lists.
///
/// Producers `LPUSH` onto `{queue}`. A receive atomically moves the oldest
/// message to `{queue}:processing`, where it stays until acknowledged.
#[derive(Clone)]
pub struct RedisTransport {
    pool: deadpool_redis::Pool,
    queue: String,
    processing: String,
}

impl RedisTransport {
    pub fn new(pool: deadpool_redis::Pool, queue: &str) -> Self {
        Self {
            pool,
            queue: queue.to_string(),
            processing: format!("{}:processing", queue),
        }
    }

    /// Moves messages left unacknowledged by a previous run back to the head
    /// of the queue, oldest first. Returns how many were moved.
    pub async fn requeue_unacked(&self) -> Res<usize> {
        let mut conn = self.pool.get().await?;
        let mut moved = 0;
        loop {
            let body: Option<String> = redis::cmd("LMOVE")
                .arg(&self.processing)
                .arg(&self.queue)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if body.is_none() {
                break;
            }
            moved += 1;
        }
        if moved > 0 {
            log::warn!("requeued {} unacknowledged message(s) on {}", moved, self.queue);
        }
        Ok(moved)
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn publish(&self, body: String) -> Res<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.lpush(&self.queue, body).await?;
        Ok(())
    }

    async fn receive(&self) -> Res<Option<Delivery>> {
        let mut conn = self.pool.get().await?;
        let body: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.queue)
            .arg(&self.processing)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(BLOCK_SECS)
            .query_async(&mut conn)
            .await?;
        Ok(body.map(|body| Delivery { body }))
    }

    async fn ack(&self, delivery: &Delivery) -> Res<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.lrem(&self.processing, 1, &delivery.body).await?;
        Ok(())
    }
}
