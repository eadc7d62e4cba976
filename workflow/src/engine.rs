use std::{
    collections::VecDeque,
    fmt::Debug,
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use common::{
    clock::Clock,
    error::{AppError, Res},
};
use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinSet,
};

use crate::{
    context::WorkflowContext,
    error::WorkflowError,
    history::{HistoryEvent, SignalRecord},
    store::HistoryStore,
};

/// A deterministic, resumable program driven by a `WorkflowContext`.
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Input, query snapshot and result of one instance.
    type State: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Stored in history so an engine only resumes its own instances.
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &mut WorkflowContext<Self::State>,
        input: Self::State,
    ) -> Result<Self::State, WorkflowError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstanceStatus<S> {
    Running,
    Completed(S),
    Failed(String),
    TimedOut,
}

impl<S> InstanceStatus<S> {
    pub fn is_running(&self) -> bool {
        matches!(self, InstanceStatus::Running)
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Lifetime ceiling of an instance, counted from its start.
    pub execution_timeout: Duration,
}

struct InstanceHandle<S> {
    signals: mpsc::UnboundedSender<SignalRecord>,
    state: watch::Receiver<S>,
    status: watch::Receiver<InstanceStatus<S>>,
}

/// Runs instances of one workflow type, one tokio task per instance.
///
/// Dropping the engine aborts its instance tasks. Their histories stay open,
/// so another engine over the same store picks them up with `recover`.
pub struct Engine<W: Workflow> {
    workflow: Arc<W>,
    store: Arc<dyn HistoryStore>,
    clock: Clock,
    options: EngineOptions,
    instances: Arc<DashMap<String, InstanceHandle<W::State>>>,
    tasks: StdMutex<JoinSet<()>>,
    // keeps inbox order and channel order identical
    signal_lock: Mutex<()>,
}

impl<W: Workflow> Engine<W> {
    pub fn new(
        workflow: W,
        store: Arc<dyn HistoryStore>,
        clock: Clock,
        options: EngineOptions,
    ) -> Self {
        Engine {
            workflow: Arc::new(workflow),
            store,
            clock,
            options,
            instances: Arc::new(DashMap::new()),
            tasks: StdMutex::new(JoinSet::new()),
            signal_lock: Mutex::new(()),
        }
    }

    /// Starts a new instance under `id`. Ids are never reused.
    pub async fn start(&self, id: &str, input: W::State) -> Res<()> {
        let started_at = self.clock.now();
        let deadline = TimeDelta::from_std(self.options.execution_timeout)
            .ok()
            .and_then(|timeout| started_at.checked_add_signed(timeout))
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "execution timeout out of range: {:?}",
                    self.options.execution_timeout
                ))
            })?;

        let started = HistoryEvent::Started {
            workflow: self.workflow.name().to_string(),
            input: serde_json::to_value(&input)?,
            started_at,
            deadline,
        };
        self.store.create(id, &started).await?;

        log::info!(
            "workflow started: workflow={}, id={}, deadline={}",
            self.workflow.name(),
            id,
            deadline
        );
        self.spawn(id.to_string(), input, deadline, VecDeque::new(), Vec::new());
        Ok(())
    }

    /// Delivers a signal to a running instance. The signal is stored before
    /// delivery so a restart does not lose it.
    pub async fn signal(&self, id: &str, name: &str, payload: Value) -> Res<()> {
        let _guard = self.signal_lock.lock().await;

        let sender = self
            .instances
            .get(id)
            .filter(|handle| handle.status.borrow().is_running())
            .map(|handle| handle.signals.clone())
            .ok_or_else(|| AppError::NotFound(format!("running workflow {}", id)))?;

        let record = self
            .store
            .push_signal(id, name, payload, self.clock.now())
            .await?;
        log::debug!("signal sent: id={}, name={}, seq={}", id, name, record.seq);

        // a closed receiver means the instance just finished; the record stays in the inbox
        let _ = sender.send(record);
        Ok(())
    }

    /// Current snapshot of a running instance.
    pub fn query(&self, id: &str) -> Option<W::State> {
        self.instances
            .get(id)
            .map(|handle| handle.state.borrow().clone())
    }

    /// Status of an instance, from memory while it runs and from its history
    /// afterwards.
    pub async fn status(&self, id: &str) -> Res<InstanceStatus<W::State>> {
        let live = self
            .instances
            .get(id)
            .map(|handle| handle.status.borrow().clone());
        match live {
            Some(status) => Ok(status),
            None => self.recorded_status(id).await,
        }
    }

    /// Resolves once the instance has finished.
    pub async fn wait(&self, id: &str) -> Res<InstanceStatus<W::State>> {
        let receiver = self.instances.get(id).map(|handle| handle.status.clone());
        match receiver {
            Some(mut status) => {
                let finished = status
                    .wait_for(|s| !s.is_running())
                    .await
                    .map_err(|_| AppError::Internal(format!("workflow {} vanished", id)))?
                    .clone();
                Ok(finished)
            }
            None => self.recorded_status(id).await,
        }
    }

    async fn recorded_status(&self, id: &str) -> Res<InstanceStatus<W::State>> {
        let status = match self.store.load(id).await?.pop() {
            Some(HistoryEvent::Completed { output, .. }) => {
                InstanceStatus::Completed(serde_json::from_value(output)?)
            }
            Some(HistoryEvent::Failed { reason, .. }) => InstanceStatus::Failed(reason),
            Some(HistoryEvent::TimedOut { .. }) => InstanceStatus::TimedOut,
            _ => InstanceStatus::Running,
        };
        Ok(status)
    }

    /// Resumes every open instance found in the store, replaying its history.
    /// Returns how many were resumed.
    pub async fn recover(&self) -> Res<usize> {
        let _guard = self.signal_lock.lock().await;
        let mut resumed = 0;

        for id in self.store.open_instances().await? {
            if self.instances.contains_key(&id) {
                continue;
            }

            let mut replay: VecDeque<HistoryEvent> = self.store.load(&id).await?.into();
            let (input, deadline) = match replay.pop_front() {
                Some(HistoryEvent::Started {
                    workflow,
                    input,
                    deadline,
                    ..
                }) if workflow == self.workflow.name() => (serde_json::from_value(input)?, deadline),
                _ => continue,
            };

            if replay.iter().any(HistoryEvent::is_terminal) {
                // finished, but the close did not make it to the store
                self.store.close(&id).await?;
                continue;
            }

            let consumed = replay
                .iter()
                .filter_map(|event| match event {
                    HistoryEvent::SignalReceived { signal, .. } => Some(signal.seq),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            let pending: Vec<SignalRecord> = self
                .store
                .signals(&id)
                .await?
                .into_iter()
                .filter(|signal| signal.seq > consumed)
                .collect();

            log::info!(
                "workflow resumed: workflow={}, id={}, events={}, pending_signals={}",
                self.workflow.name(),
                id,
                replay.len(),
                pending.len()
            );
            self.spawn(id, input, deadline, replay, pending);
            resumed += 1;
        }

        Ok(resumed)
    }

    fn spawn(
        &self,
        id: String,
        input: W::State,
        deadline: DateTime<Utc>,
        replay: VecDeque<HistoryEvent>,
        pending: Vec<SignalRecord>,
    ) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        for signal in pending {
            // receiver is alive until the context is dropped
            let _ = signal_tx.send(signal);
        }
        let (state_tx, state_rx) = watch::channel(input.clone());
        let (status_tx, status_rx) = watch::channel(InstanceStatus::Running);

        self.instances.insert(
            id.clone(),
            InstanceHandle {
                signals: signal_tx,
                state: state_rx,
                status: status_rx,
            },
        );

        let ctx = WorkflowContext::new(
            id.clone(),
            self.store.clone(),
            self.clock,
            replay,
            signal_rx,
            state_tx,
        );
        let workflow = self.workflow.clone();
        let store = self.store.clone();
        let clock = self.clock;
        let instances = self.instances.clone();

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let status = run_instance(workflow.as_ref(), ctx, input, deadline, store, clock).await;
            instances.remove(&id);
            status_tx.send_replace(status);
        });
    }
}

async fn run_instance<W: Workflow>(
    workflow: &W,
    mut ctx: WorkflowContext<W::State>,
    input: W::State,
    deadline: DateTime<Utc>,
    store: Arc<dyn HistoryStore>,
    clock: Clock,
) -> InstanceStatus<W::State> {
    let id = ctx.id().to_string();
    let limit = clock.until(deadline);

    let result = match tokio::time::timeout(limit, workflow.run(&mut ctx, input)).await {
        Ok(result) => result,
        Err(_) => Err(WorkflowError::TimedOut(limit)),
    };

    let at = clock.now();
    let (event, status) = match result {
        Ok(output) => match serde_json::to_value(&output) {
            Ok(value) => (
                HistoryEvent::Completed { output: value, at },
                InstanceStatus::Completed(output),
            ),
            Err(e) => (
                HistoryEvent::Failed {
                    reason: e.to_string(),
                    at,
                },
                InstanceStatus::Failed(e.to_string()),
            ),
        },
        Err(WorkflowError::TimedOut(_)) => (HistoryEvent::TimedOut { at }, InstanceStatus::TimedOut),
        Err(e) => (
            HistoryEvent::Failed {
                reason: e.to_string(),
                at,
            },
            InstanceStatus::Failed(e.to_string()),
        ),
    };

    match &status {
        InstanceStatus::Completed(_) => {
            log::info!("workflow completed: workflow={}, id={}", workflow.name(), id)
        }
        InstanceStatus::TimedOut => log::warn!(
            "workflow timed out: workflow={}, id={}, deadline={}",
            workflow.name(),
            id,
            deadline
        ),
        InstanceStatus::Failed(reason) => log::error!(
            "workflow failed: workflow={}, id={}, reason={}",
            workflow.name(),
            id,
            reason
        ),
        InstanceStatus::Running => {}
    }

    // an instance whose outcome is not stored stays open and is replayed on restart
    if let Err(e) = store.append(&id, &event).await {
        log::error!("failed to record outcome of workflow {}: {}", id, e);
    } else if let Err(e) = store.close(&id).await {
        log::error!("failed to close workflow {}: {}", id, e);
    }

    status
}
