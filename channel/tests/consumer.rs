use std::sync::Arc;

use async_trait::async_trait;
use channel::{
    CancelSubscription, Command, CommandHandler, Consumer, MemoryTransport, Producer,
    StartSubscription, Transport,
};
use common::error::{AppError, Res};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Command>>,
    fail: bool,
}

#[async_trait]
impl CommandHandler for Recorder {
    async fn handle(&self, command: Command) -> Res<()> {
        self.seen.lock().await.push(command);
        if self.fail {
            return Err(AppError::Conflict("already active".into()));
        }
        Ok(())
    }
}

fn start() -> Command {
    Command::Start(StartSubscription {
        user_id: Uuid::new_v4(),
    })
}

fn setup() -> (Arc<MemoryTransport>, Producer, Consumer) {
    let transport = Arc::new(MemoryTransport::new());
    let producer = Producer::new(transport.clone());
    let consumer = Consumer::new(transport.clone());
    (transport, producer, consumer)
}

#[tokio::test]
async fn delivers_commands_in_order_and_acks() {
    let (transport, producer, consumer) = setup();
    let first = start();
    let second = Command::Cancel(CancelSubscription {
        subscription_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
    });
    producer.send(&first).await.unwrap();
    producer.send(&second).await.unwrap();

    let handler = Recorder::default();
    assert!(consumer.poll(&handler).await.unwrap());
    assert!(consumer.poll(&handler).await.unwrap());
    assert!(!consumer.poll(&handler).await.unwrap());

    assert_eq!(*handler.seen.lock().await, vec![first, second]);
    assert_eq!(transport.acked().await, 2);
    assert!(transport.in_flight().await.is_empty());
}

#[tokio::test]
async fn handler_errors_are_consumed() {
    let (transport, producer, consumer) = setup();
    producer.send(&start()).await.unwrap();

    let handler = Recorder {
        fail: true,
        ..Recorder::default()
    };
    assert!(consumer.poll(&handler).await.unwrap());

    assert_eq!(handler.seen.lock().await.len(), 1);
    assert_eq!(transport.acked().await, 1);
}

#[tokio::test]
async fn unknown_types_are_dropped() {
    let (transport, _, consumer) = setup();
    transport
        .publish(r#"{"type":"RenewSubscription","data":{}}"#.into())
        .await
        .unwrap();

    let handler = Recorder::default();
    assert!(consumer.poll(&handler).await.unwrap());

    assert!(handler.seen.lock().await.is_empty());
    assert_eq!(transport.acked().await, 1);
}

#[tokio::test]
async fn undecodable_payload_is_acked_and_skipped() {
    let (transport, producer, consumer) = setup();
    let before = start();
    let after = start();
    producer.send(&before).await.unwrap();
    transport
        .publish(r#"{"type":"StartSubscription","data":{"user_id":42}}"#.into())
        .await
        .unwrap();
    producer.send(&after).await.unwrap();

    let handler = Recorder::default();
    for _ in 0..3 {
        assert!(consumer.poll(&handler).await.unwrap());
    }

    assert_eq!(*handler.seen.lock().await, vec![before, after]);
    assert_eq!(transport.acked().await, 3);
    assert!(transport.in_flight().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_envelope_halts_consumption() {
    let (transport, producer, consumer) = setup();
    let before = start();
    producer.send(&before).await.unwrap();
    transport.publish("{not json".into()).await.unwrap();
    producer.send(&start()).await.unwrap();

    let handler = Recorder::default();
    let err = consumer.listen(&handler).await.unwrap_err();

    assert!(matches!(err, AppError::Serialization(_)));
    assert_eq!(*handler.seen.lock().await, vec![before]);
    assert_eq!(transport.acked().await, 1);
    assert_eq!(transport.in_flight().await, vec!["{not json".to_string()]);
    assert_eq!(transport.ready().await, 1);
}
