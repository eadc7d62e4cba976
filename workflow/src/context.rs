use std::{collections::VecDeque, future::Future, sync::Arc, time::Duration};

use chrono::TimeDelta;
use common::{clock::Clock, error::AppError};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{mpsc, watch};

use crate::{
    error::{ActivityFailure, WorkflowError},
    history::{HistoryEvent, SignalRecord},
    retry::ActivityOptions,
    store::HistoryStore,
};

/// What ended `WorkflowContext::await_signal_or_timer`.
#[derive(Debug, Clone, PartialEq)]
pub enum Wake {
    Timer,
    Signal(SignalRecord),
}

/// Handle a workflow uses for everything that is not pure computation.
///
/// While recorded history remains, calls are answered from it and nothing is
/// executed; afterwards they run live and append their outcome.
pub struct WorkflowContext<S> {
    id: String,
    store: Arc<dyn HistoryStore>,
    clock: Clock,
    replay: VecDeque<HistoryEvent>,
    signals: mpsc::UnboundedReceiver<SignalRecord>,
    state: watch::Sender<S>,
}

impl<S> WorkflowContext<S>
where
    S: Clone + Send + Sync,
{
    pub(crate) fn new(
        id: String,
        store: Arc<dyn HistoryStore>,
        clock: Clock,
        replay: VecDeque<HistoryEvent>,
        signals: mpsc::UnboundedReceiver<SignalRecord>,
        state: watch::Sender<S>,
    ) -> Self {
        WorkflowContext {
            id,
            store,
            clock,
            replay,
            signals,
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_replaying(&self) -> bool {
        !self.replay.is_empty()
    }

    /// Publishes the snapshot returned by queries.
    pub fn set_state(&self, state: &S) {
        self.state.send_replace(state.clone());
    }

    async fn record(&self, event: HistoryEvent) -> Result<(), WorkflowError> {
        self.store.append(&self.id, &event).await?;
        Ok(())
    }

    fn diverged(&self, expected: &str, found: &HistoryEvent) -> WorkflowError {
        WorkflowError::NonDeterminism(format!(
            "workflow {} expected {} but history has {}",
            self.id,
            expected,
            found.label()
        ))
    }

    /// Waits until `timeout` elapses or a signal arrives, whichever is first.
    pub async fn await_signal_or_timer(&mut self, timeout: Duration) -> Result<Wake, WorkflowError> {
        let fire_at = match self.replay.pop_front() {
            Some(HistoryEvent::TimerStarted { fire_at }) => fire_at,
            Some(other) => return Err(self.diverged("timer_started", &other)),
            None => {
                let fire_at = TimeDelta::from_std(timeout)
                    .ok()
                    .and_then(|delta| self.clock.now().checked_add_signed(delta))
                    .ok_or_else(|| {
                        WorkflowError::Invalid(format!("timer out of range: {:?}", timeout))
                    })?;
                self.record(HistoryEvent::TimerStarted { fire_at }).await?;
                fire_at
            }
        };

        match self.replay.pop_front() {
            Some(HistoryEvent::TimerFired { .. }) => return Ok(Wake::Timer),
            Some(HistoryEvent::SignalReceived { signal, .. }) => return Ok(Wake::Signal(signal)),
            Some(other) => return Err(self.diverged("timer_fired or signal_received", &other)),
            None => {}
        }

        // a timer that fired while the process was down fires right away
        let delay = self.clock.until(fire_at);
        tokio::select! {
            biased;
            Some(signal) = self.signals.recv() => {
                self.record(HistoryEvent::SignalReceived {
                    signal: signal.clone(),
                    received_at: self.clock.now(),
                })
                .await?;
                Ok(Wake::Signal(signal))
            }
            _ = tokio::time::sleep(delay) => {
                self.record(HistoryEvent::TimerFired { at: self.clock.now() }).await?;
                Ok(Wake::Timer)
            }
        }
    }

    /// Takes every signal that already arrived, without waiting for more.
    pub async fn drain_signals(&mut self) -> Result<Vec<SignalRecord>, WorkflowError> {
        let mut drained = Vec::new();

        while matches!(self.replay.front(), Some(HistoryEvent::SignalReceived { .. })) {
            if let Some(HistoryEvent::SignalReceived { signal, .. }) = self.replay.pop_front() {
                drained.push(signal);
            }
        }
        if !self.replay.is_empty() {
            return Ok(drained);
        }

        while let Ok(signal) = self.signals.try_recv() {
            self.record(HistoryEvent::SignalReceived {
                signal: signal.clone(),
                received_at: self.clock.now(),
            })
            .await?;
            drained.push(signal);
        }
        Ok(drained)
    }

    /// Runs `activity` under `options`, retrying per its policy, and records
    /// the final outcome. Replays the recorded outcome instead when present.
    pub async fn execute_activity<T, F, Fut>(
        &mut self,
        name: &str,
        options: &ActivityOptions,
        activity: F,
    ) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ActivityFailure>> + Send,
    {
        match self.replay.pop_front() {
            Some(HistoryEvent::ActivityCompleted {
                activity: recorded,
                attempts,
                result,
            }) if recorded == name => {
                return match result {
                    Ok(value) => serde_json::from_value(value)
                        .map_err(|e| WorkflowError::Store(AppError::from(e))),
                    Err(failure) => Err(WorkflowError::Activity {
                        activity: recorded,
                        attempts,
                        failure,
                    }),
                };
            }
            Some(other) => return Err(self.diverged(&format!("activity {}", name), &other)),
            None => {}
        }

        let (attempts, outcome) = run_with_retries(name, options, &activity).await;

        let recorded = match &outcome {
            Ok(value) => Ok(serde_json::to_value(value).map_err(AppError::from)?),
            Err(failure) => Err(failure.clone()),
        };
        self.record(HistoryEvent::ActivityCompleted {
            activity: name.to_string(),
            attempts,
            result: recorded,
        })
        .await?;

        outcome.map_err(|failure| WorkflowError::Activity {
            activity: name.to_string(),
            attempts,
            failure,
        })
    }
}

async fn run_with_retries<T, F, Fut>(
    name: &str,
    options: &ActivityOptions,
    activity: &F,
) -> (u32, Result<T, ActivityFailure>)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ActivityFailure>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(options.start_to_close_timeout, activity()).await {
            Ok(result) => result,
            Err(_) => Err(ActivityFailure::timeout(options.start_to_close_timeout)),
        };

        match result {
            Ok(value) => return (attempt, Ok(value)),
            Err(failure) if options.retry_policy.should_retry(attempt, &failure) => {
                let delay = options.retry_policy.backoff(attempt);
                log::warn!(
                    "activity {} attempt {} failed, retrying in {:?}: {}",
                    name,
                    attempt,
                    delay,
                    failure
                );
                tokio::time::sleep(delay).await;
            }
            Err(failure) => {
                log::debug!("activity {} gave up after {} attempt(s): {}", name, attempt, failure);
                return (attempt, Err(failure));
            }
        }
    }
}
