//! Command channel: JSON envelopes carried over an at-least-once transport.

pub mod command;
pub mod consumer;
pub mod envelope;
pub mod memory;
pub mod producer;
pub mod redis_queue;
pub mod transport;

pub use command::{CancelSubscription, Command, StartSubscription};
pub use consumer::{CommandHandler, Consumer};
pub use envelope::Envelope;
pub use memory::MemoryTransport;
pub use producer::Producer;
pub use redis_queue::RedisTransport;
pub use transport::{Delivery, Transport};
