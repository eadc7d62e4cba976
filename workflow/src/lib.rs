//! Durable execution for long-running, single-threaded workflows.
//!
//! Every decision a workflow takes (timer started or fired, signal received,
//! activity result) is appended to a per-instance history. After a restart the
//! engine replays that history through the same workflow code, which therefore
//! must take time and external input only from its `WorkflowContext`.

pub mod context;
pub mod engine;
pub mod error;
pub mod history;
pub mod redis_store;
pub mod retry;
pub mod store;

pub use context::{Wake, WorkflowContext};
pub use engine::{Engine, EngineOptions, InstanceStatus, Workflow};
pub use error::{ActivityFailure, WorkflowError};
pub use history::{HistoryEvent, SignalRecord};
pub use retry::{ActivityOptions, RetryPolicy};
pub use store::{HistoryStore, MemoryHistoryStore};
