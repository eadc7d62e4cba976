use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use redis::AsyncCommands;
use serde_json::Value;

use crate::{
    history::{HistoryEvent, SignalRecord},
    store::HistoryStore,
};

/// Registers an id, writes its first event and opens it, or does nothing
/// when the id is already registered.
///
/// KEYS: instances set, history list, open set. ARGV: id, event.
const CREATE: &str = r"
if redis.call('SADD', KEYS[1], ARGV[1]) == 0 then
    return 0
end
redis.call('RPUSH', KEYS[2], ARGV[2])
redis.call('SADD', KEYS[3], ARGV[1])
return 1
";

/// History store on Redis.
///
/// Layout under `prefix`:
/// - `{prefix}:instances` set of every id ever started
/// - `{prefix}:open` set of ids without a terminal event
/// - `{prefix}:{id}:history` list of JSON events
/// - `{prefix}:{id}:signals` list of JSON signal records
/// - `{prefix}:{id}:signal_seq` counter behind `SignalRecord::seq`
#[derive(Clone)]
pub struct RedisHistoryStore {
    pool: deadpool_redis::Pool,
    prefix: String,
}

impl RedisHistoryStore {
    pub fn new(pool: deadpool_redis::Pool, prefix: &str) -> Self {
        Self {
            pool,
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, id: &str, suffix: &str) -> String {
        format!("{}:{}:{}", self.prefix, id, suffix)
    }

    fn instances_key(&self) -> String {
        format!("{}:instances", self.prefix)
    }

    fn open_key(&self) -> String {
        format!("{}:open", self.prefix)
    }

    fn create_keys(&self, id: &str) -> [String; 3] {
        [self.instances_key(), self.key(id, "history"), self.open_key()]
    }

    async fn known(&self, conn: &mut deadpool_redis::Connection, id: &str) -> Res<()> {
        let known: bool = conn.sismember(self.instances_key(), id).await?;
        if !known {
            return Err(AppError::NotFound(format!("workflow history {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn create(&self, id: &str, started: &HistoryEvent) -> Res<()> {
        let event = serde_json::to_string(started)?;
        let mut conn = self.pool.get().await?;

        let created: i64 = redis::Script::new(CREATE)
            .key(&self.create_keys(id))
            .arg(id)
            .arg(event)
            .invoke_async(&mut conn)
            .await?;
        if created == 0 {
            return Err(AppError::Conflict(format!(
                "workflow already started: id={}",
                id
            )));
        }
        Ok(())
    }

    async fn append(&self, id: &str, event: &HistoryEvent) -> Res<()> {
        let mut conn = self.pool.get().await?;
        self.known(&mut conn, id).await?;

        let event = serde_json::to_string(event)?;
        let _: i64 = conn.rpush(self.key(id, "history"), event).await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Res<Vec<HistoryEvent>> {
        let mut conn = self.pool.get().await?;
        self.known(&mut conn, id).await?;

        let raw: Vec<String> = conn.lrange(self.key(id, "history"), 0, -1).await?;
        raw.iter()
            .map(|event| serde_json::from_str(event).map_err(AppError::from))
            .collect()
    }

    async fn close(&self, id: &str) -> Res<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.srem(self.open_key(), id).await?;
        Ok(())
    }

    async fn open_instances(&self) -> Res<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let mut ids: Vec<String> = conn.smembers(self.open_key()).await?;
        ids.sort();
        Ok(ids)
    }

    async fn push_signal(
        &self,
        id: &str,
        name: &str,
        payload: Value,
        sent_at: DateTime<Utc>,
    ) -> Res<SignalRecord> {
        let mut conn = self.pool.get().await?;
        self.known(&mut conn, id).await?;

        let seq: u64 = conn.incr(self.key(id, "signal_seq"), 1).await?;
        let record = SignalRecord {
            seq,
            name: name.to_string(),
            payload,
            sent_at,
        };
        let _: i64 = conn
            .rpush(self.key(id, "signals"), serde_json::to_string(&record)?)
            .await?;
        Ok(record)
    }

    async fn signals(&self, id: &str) -> Res<Vec<SignalRecord>> {
        let mut conn = self.pool.get().await?;
        self.known(&mut conn, id).await?;

        let raw: Vec<String> = conn.lrange(self.key(id, "signals"), 0, -1).await?;
        raw.iter()
            .map(|signal| serde_json::from_str(signal).map_err(AppError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;

    fn store(url: &str, prefix: &str) -> RedisHistoryStore {
        let pool = deadpool_redis::Config::from_url(url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        RedisHistoryStore::new(pool, prefix)
    }

    fn started() -> HistoryEvent {
        let now = Utc::now();
        HistoryEvent::Started {
            workflow: "ticker".into(),
            input: json!({"ticks": 0}),
            started_at: now,
            deadline: now + TimeDelta::hours(1),
        }
    }

    #[test]
    fn create_writes_index_history_and_open_set_together() {
        let store = store("redis://127.0.0.1:6379", "wf");
        assert_eq!(
            store.create_keys("a"),
            [
                "wf:instances".to_string(),
                "wf:a:history".to_string(),
                "wf:open".to_string()
            ]
        );
        assert_eq!(CREATE.matches("redis.call").count(), 3);
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn second_create_conflicts_and_keeps_the_first_history() {
        let url = std::env::var("REDIS_URL").unwrap();
        let prefix = format!("test:{}", Utc::now().timestamp_micros());
        let store = store(&url, &prefix);

        store.create("a", &started()).await.unwrap();
        let err = store.create("a", &started()).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.load("a").await.unwrap().len(), 1);
        assert_eq!(store.open_instances().await.unwrap(), vec!["a".to_string()]);
    }
}
