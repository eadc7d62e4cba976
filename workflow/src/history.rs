use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ActivityFailure;

/// A signal as stored in an instance inbox. `seq` starts at 1 and grows by
/// one per signal sent to the same instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub seq: u64,
    pub name: String,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEvent {
    Started {
        workflow: String,
        input: Value,
        started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },
    TimerStarted {
        fire_at: DateTime<Utc>,
    },
    TimerFired {
        at: DateTime<Utc>,
    },
    SignalReceived {
        signal: SignalRecord,
        received_at: DateTime<Utc>,
    },
    ActivityCompleted {
        activity: String,
        attempts: u32,
        result: Result<Value, ActivityFailure>,
    },
    Completed {
        output: Value,
        at: DateTime<Utc>,
    },
    Failed {
        reason: String,
        at: DateTime<Utc>,
    },
    TimedOut {
        at: DateTime<Utc>,
    },
}

impl HistoryEvent {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryEvent::Started { .. } => "started",
            HistoryEvent::TimerStarted { .. } => "timer_started",
            HistoryEvent::TimerFired { .. } => "timer_fired",
            HistoryEvent::SignalReceived { .. } => "signal_received",
            HistoryEvent::ActivityCompleted { .. } => "activity_completed",
            HistoryEvent::Completed { .. } => "completed",
            HistoryEvent::Failed { .. } => "failed",
            HistoryEvent::TimedOut { .. } => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HistoryEvent::Completed { .. }
                | HistoryEvent::Failed { .. }
                | HistoryEvent::TimedOut { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_tagged_by_name() {
        let event = HistoryEvent::ActivityCompleted {
            activity: "charge".into(),
            attempts: 2,
            result: Err(ActivityFailure::non_retryable("insufficient_funds", "40 < 50")),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "activity_completed");
        assert_eq!(value["result"]["Err"]["kind"], "insufficient_funds");

        let back: HistoryEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn terminal_events() {
        let at = Utc::now();
        assert!(HistoryEvent::Completed { output: json!({}), at }.is_terminal());
        assert!(HistoryEvent::TimedOut { at }.is_terminal());
        assert!(!HistoryEvent::TimerFired { at }.is_terminal());
    }
}
