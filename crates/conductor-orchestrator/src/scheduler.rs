use crate::config::OrchestratorConfig;
use crate::queue::{PriorityQueue, QueueItem};
use crate::selector::select_agent_kind;
use chrono::{DateTime, Utc};
use conductor_agent::{AgentRegistry, ModelProvider, PhaseCycle};
use conductor_core::{
    AgentKind, ConductorResult, Event, EventBus, ExecutionError, ExecutionMetrics, Phase, Task,
    TaskResult, TaskStatus,
};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// One in-flight phase-cycle run.
///
/// Created when a queue item is admitted past the concurrency gate,
/// destroyed when the run settles (success, failure, or timeout).
struct ExecutionSlot {
    /// Unique per attempt, distinct from the task id.
    execution_id: Uuid,
    task_id: Uuid,
    kind: AgentKind,
    started_at: DateTime<Utc>,
    /// Progress handle fed by the phase cycle.
    phase: watch::Receiver<Phase>,
}

/// Introspection view of one execution slot.
#[derive(Debug, Clone, Serialize)]
pub struct SlotInfo {
    /// The attempt's execution id.
    pub execution_id: Uuid,
    /// The owning task.
    pub task_id: Uuid,
    /// The agent kind running the attempt.
    pub kind: AgentKind,
    /// The phase the attempt is currently in.
    pub phase: Phase,
    /// When the attempt was admitted.
    pub started_at: DateTime<Utc>,
}

/// Snapshot of the orchestrator's observable state.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    /// Whether the admission loop is active.
    pub running: bool,
    /// Whether admissions are paused.
    pub paused: bool,
    /// Plurality phase among in-flight slots; `None` means idle.
    pub current_phase: Option<Phase>,
    /// Number of queued tasks.
    pub queued: usize,
    /// Number of in-flight attempts.
    pub in_flight: usize,
    /// Number of completed tasks.
    pub completed: usize,
    /// Number of terminally failed tasks.
    pub failed: usize,
    /// Cumulative provider cost across completed attempts, in USD.
    pub total_cost_usd: f64,
}

/// Shared mutable aggregate, owned exclusively by the scheduler and
/// mutated under a single writer lock. Never persisted.
struct OrchestratorState {
    queue: PriorityQueue,
    in_flight: HashMap<Uuid, ExecutionSlot>,
    completed: Vec<TaskResult>,
    failed: Vec<TaskResult>,
    total_cost_usd: f64,
    running: bool,
    paused: bool,
}

struct Inner {
    config: OrchestratorConfig,
    registry: Arc<AgentRegistry>,
    cycle: PhaseCycle,
    bus: Arc<EventBus>,
    state: RwLock<OrchestratorState>,
    /// Signalled on every slot settlement; `stop` waits on it.
    settled: Notify,
}

/// The task scheduler: priority queue, concurrency admission control,
/// timeout enforcement, retry policy, and event/status reporting.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Creates a stopped orchestrator.
    ///
    /// Fails with `Config` on invalid tunables and with `UnknownAgentKind`
    /// when the registry does not cover every kind the selector can
    /// resolve to — both are construction-time programming errors, not
    /// runtime failures.
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<AgentRegistry>,
        provider: Arc<dyn ModelProvider>,
    ) -> ConductorResult<Self> {
        config.validate()?;
        for kind in AgentKind::CONCRETE {
            registry.get(kind)?;
        }

        let bus = Arc::new(EventBus::new());
        let cycle = PhaseCycle::new(provider, Arc::clone(&bus));
        let state = OrchestratorState {
            queue: PriorityQueue::new(config.queue_capacity),
            in_flight: HashMap::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            total_cost_usd: 0.0,
            running: false,
            paused: false,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry,
                cycle,
                bus,
                state: RwLock::new(state),
                settled: Notify::new(),
            }),
        })
    }

    /// The event bus carrying lifecycle and scheduling events.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// Begins admitting queued work. Idempotent.
    pub async fn start(&self) {
        {
            let mut state = self.inner.state.write().await;
            if state.running {
                return;
            }
            state.running = true;
        }
        info!(
            max_concurrent = self.inner.config.max_concurrent,
            "Orchestrator started"
        );
        self.inner.bus.publish(&Event::orchestrator(
            Event::STARTED,
            json!({ "max_concurrent": self.inner.config.max_concurrent }),
        ));
        self.pump().await;
    }

    /// Enqueues a task, returning its id.
    ///
    /// Fails with `QueueFull` at capacity; the queue is unchanged and the
    /// task is not admitted.
    pub async fn dispatch(&self, task: Task) -> ConductorResult<Uuid> {
        let task_id = task.id;
        let (priority, should_pump) = {
            let mut state = self.inner.state.write().await;
            let priority = state.queue.enqueue(task)?;
            (priority, state.running && !state.paused)
        };

        info!(task_id = %task_id, priority, "Task dispatched");
        self.inner.bus.publish(&Event::task(
            Event::TASK_QUEUED,
            task_id,
            None,
            json!({ "priority": priority }),
        ));

        if should_pump {
            self.pump().await;
        }
        Ok(task_id)
    }

    /// Stops new admissions; in-flight work runs to completion.
    pub async fn pause(&self) {
        self.inner.state.write().await.paused = true;
        info!("Orchestrator paused");
        self.inner
            .bus
            .publish(&Event::orchestrator(Event::PAUSED, json!({})));
    }

    /// Resumes admissions after a pause.
    pub async fn resume(&self) {
        self.inner.state.write().await.paused = false;
        info!("Orchestrator resumed");
        self.inner
            .bus
            .publish(&Event::orchestrator(Event::RESUMED, json!({})));
        self.pump().await;
    }

    /// Stops admitting work and blocks until every in-flight slot has
    /// settled (success, failure, or timeout).
    pub async fn stop(&self) {
        self.inner.state.write().await.running = false;
        info!("Orchestrator stopping; draining in-flight work");

        loop {
            // Register for the settlement signal before checking, so a slot
            // settling between the check and the await cannot be missed.
            let settled = self.inner.settled.notified();
            if self.inner.state.read().await.in_flight.is_empty() {
                break;
            }
            settled.await;
        }

        info!("Orchestrator stopped");
        self.inner
            .bus
            .publish(&Event::orchestrator(Event::STOPPED, json!({})));
    }

    /// Removes a task from the queue if it has not been admitted yet.
    ///
    /// Returns whether a removal occurred. In-flight attempts are never
    /// hard-cancelled; they run to completion or timeout.
    pub async fn cancel_task(&self, task_id: Uuid) -> bool {
        let removed = self.inner.state.write().await.queue.remove(task_id);
        match removed {
            Some(mut item) => {
                item.task.status = TaskStatus::Cancelled;
                info!(task_id = %task_id, "Task cancelled while queued");
                self.inner.bus.publish(&Event::task(
                    Event::TASK_CANCELLED,
                    task_id,
                    None,
                    json!({ "attempts": item.attempts }),
                ));
                true
            }
            None => false,
        }
    }

    /// A consistent snapshot of counts, flags, and the plurality phase.
    pub async fn status(&self) -> OrchestratorStatus {
        let state = self.inner.state.read().await;
        let phases = state.in_flight.values().map(|slot| *slot.phase.borrow());
        OrchestratorStatus {
            running: state.running,
            paused: state.paused,
            current_phase: plurality_phase(phases),
            queued: state.queue.len(),
            in_flight: state.in_flight.len(),
            completed: state.completed.len(),
            failed: state.failed.len(),
            total_cost_usd: state.total_cost_usd,
        }
    }

    /// Per-slot introspection of in-flight work.
    pub async fn snapshot(&self) -> Vec<SlotInfo> {
        let state = self.inner.state.read().await;
        let mut slots: Vec<SlotInfo> = state
            .in_flight
            .values()
            .map(|slot| SlotInfo {
                execution_id: slot.execution_id,
                task_id: slot.task_id,
                kind: slot.kind,
                phase: *slot.phase.borrow(),
                started_at: slot.started_at,
            })
            .collect();
        slots.sort_by_key(|s| s.started_at);
        slots
    }

    /// Results of all completed tasks.
    pub async fn completed_results(&self) -> Vec<TaskResult> {
        self.inner.state.read().await.completed.clone()
    }

    /// Results of all terminally failed tasks.
    pub async fn failed_results(&self) -> Vec<TaskResult> {
        self.inner.state.read().await.failed.clone()
    }

    /// The admission loop: admits queued work while the concurrency gate
    /// allows. Re-invoked after every dispatch, resume, and settlement so
    /// the gate is always re-evaluated promptly.
    fn pump(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
        loop {
            let admitted = {
                let mut state = self.inner.state.write().await;
                if !state.running
                    || state.paused
                    || state.in_flight.len() >= self.inner.config.max_concurrent
                {
                    return;
                }

                // Boost immediately before the admission decision so boosts
                // are never missed due to staleness.
                if self.inner.config.age_boost_enabled {
                    state
                        .queue
                        .boost_aged(self.inner.config.age_boost_threshold_ms);
                }

                let Some(mut item) = state.queue.dequeue_highest() else {
                    return;
                };
                item.task.status = TaskStatus::Running;

                let kind = select_agent_kind(&item.task);
                let execution_id = Uuid::new_v4();
                let task_id = item.task.id;
                let (progress_tx, progress_rx) = watch::channel(Phase::Reason);

                state.in_flight.insert(
                    execution_id,
                    ExecutionSlot {
                        execution_id,
                        task_id,
                        kind,
                        started_at: Utc::now(),
                        phase: progress_rx,
                    },
                );
                (item, kind, execution_id, progress_tx)
            };

            // The slot is already counted against the gate, so the admission
            // event is published before the attempt can emit anything.
            let (item, kind, execution_id, progress_tx) = admitted;
            let task_id = item.task.id;
            info!(task_id = %task_id, execution_id = %execution_id, agent = %kind, "Task admitted");
            self.inner.bus.publish(&Event::task(
                Event::TASK_ADMITTED,
                task_id,
                None,
                json!({ "execution_id": execution_id, "agent": kind.to_string() }),
            ));
            tokio::spawn(
                self.clone()
                    .run_attempt(item, kind, execution_id, progress_tx),
            );
        }
        })
    }

    /// Runs one attempt: the phase cycle raced against the per-task
    /// timeout. The first to settle wins; the losing cycle future is
    /// dropped and its eventual result discarded.
    async fn run_attempt(
        self,
        item: QueueItem,
        kind: AgentKind,
        execution_id: Uuid,
        progress: watch::Sender<Phase>,
    ) {
        let deadline = Duration::from_millis(self.inner.config.task_timeout_ms);

        let result = match self.inner.registry.get(kind) {
            Ok(spec) => {
                match tokio::time::timeout(
                    deadline,
                    self.inner.cycle.execute(&item.task, spec, &progress),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            task_id = %item.task.id,
                            timeout_ms = self.inner.config.task_timeout_ms,
                            "Attempt timed out"
                        );
                        TaskResult::failure(
                            item.task.id,
                            ExecutionError::timeout(self.inner.config.task_timeout_ms),
                            ExecutionMetrics::default(),
                        )
                    }
                }
            }
            // Unreachable with a construction-validated registry; kept as a
            // terminal failure rather than a panic for custom registries.
            Err(e) => {
                error!(task_id = %item.task.id, agent = %kind, error = %e, "No agent for kind");
                TaskResult::failure(
                    item.task.id,
                    ExecutionError {
                        code: ExecutionError::EXECUTION_ERROR.to_string(),
                        message: e.to_string(),
                        phase: None,
                        recoverable: false,
                    },
                    ExecutionMetrics::default(),
                )
            }
        };

        let event = {
            let mut state = self.inner.state.write().await;
            // Free the slot before result handling so the concurrency gate
            // can never leak capacity, whatever settle does.
            state.in_flight.remove(&execution_id);
            self.settle(&mut state, item, result)
        };
        self.inner.bus.publish(&event);
        self.inner.settled.notify_waiters();

        // Backfill the freed slot unconditionally.
        self.pump().await;
    }

    /// Applies the retry-or-terminal policy to a settled attempt and
    /// returns the event to publish.
    fn settle(
        &self,
        state: &mut OrchestratorState,
        mut item: QueueItem,
        mut result: TaskResult,
    ) -> Event {
        let task_id = item.task.id;

        if result.success {
            result.attempts = item.attempts + 1;
            state.total_cost_usd += result.metrics.cost_usd;
            info!(
                task_id = %task_id,
                cost_usd = result.metrics.cost_usd,
                duration_ms = result.metrics.duration_ms,
                attempts = result.attempts,
                "Task completed"
            );
            let event = Event::task(
                Event::TASK_COMPLETED,
                task_id,
                None,
                json!({
                    "cost_usd": result.metrics.cost_usd,
                    "duration_ms": result.metrics.duration_ms,
                    "attempts": result.attempts,
                }),
            );
            state.completed.push(result);
            return event;
        }

        item.attempts += 1;
        let message = result
            .errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "unknown failure".to_string());
        item.last_error = Some(message.clone());
        let retryable = result.errors.first().map_or(true, |e| e.recoverable);

        if self.inner.config.retry_failed && retryable && item.attempts < self.inner.config.max_retries
        {
            warn!(
                task_id = %task_id,
                attempt = item.attempts,
                error = %message,
                "Attempt failed; requeueing"
            );
            let event = Event::task(
                Event::TASK_RETRY,
                task_id,
                None,
                json!({ "attempt": item.attempts, "error": message }),
            );
            item.task.status = TaskStatus::Queued;
            state.queue.requeue(item);
            return event;
        }

        // Terminal failure: zeroed metrics except wall time since the
        // original enqueue, attempt count preserved for diagnostics.
        let metrics = ExecutionMetrics {
            duration_ms: (Utc::now() - item.enqueued_at).num_milliseconds().max(0) as u64,
            ..ExecutionMetrics::default()
        };
        let last_error = result.errors.pop().unwrap_or_else(|| ExecutionError {
            code: ExecutionError::EXECUTION_ERROR.to_string(),
            message: message.clone(),
            phase: None,
            recoverable: false,
        });
        let mut terminal = TaskResult::failure(task_id, last_error, metrics);
        terminal.attempts = item.attempts;

        error!(
            task_id = %task_id,
            attempts = item.attempts,
            error = %message,
            "Task failed terminally"
        );
        let event = Event::task(
            Event::TASK_FAILED,
            task_id,
            None,
            json!({ "attempts": item.attempts, "error": message }),
        );
        state.failed.push(terminal);
        event
    }
}

/// Picks the most common phase, breaking ties by [`Phase::ALL`] order.
/// `None` means nothing is in flight.
fn plurality_phase(phases: impl Iterator<Item = Phase>) -> Option<Phase> {
    let mut counts: HashMap<Phase, usize> = HashMap::new();
    for phase in phases {
        *counts.entry(phase).or_default() += 1;
    }
    let mut best: Option<(Phase, usize)> = None;
    for phase in Phase::ALL {
        let count = counts.get(&phase).copied().unwrap_or(0);
        if count > 0 && best.map_or(true, |(_, b)| count > b) {
            best = Some((phase, count));
        }
    }
    best.map(|(phase, _)| phase)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_agent::{default_agents, ModelRequest, ModelResponse};

    struct NoopProvider;

    #[async_trait]
    impl ModelProvider for NoopProvider {
        async fn complete(&self, _request: ModelRequest) -> ConductorResult<ModelResponse> {
            Ok(ModelResponse {
                content: String::new(),
                tokens_in: 0,
                tokens_out: 0,
                cost_usd: 0.0,
            })
        }
    }

    fn orchestrator(config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::new(config, Arc::new(default_agents()), Arc::new(NoopProvider)).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = OrchestratorConfig {
            max_concurrent: 0,
            ..OrchestratorConfig::default()
        };
        let result = Orchestrator::new(config, Arc::new(default_agents()), Arc::new(NoopProvider));
        assert!(matches!(result, Err(conductor_core::ConductorError::Config(_))));
    }

    #[test]
    fn test_incomplete_registry_rejected_at_construction() {
        let registry = AgentRegistry::new();
        let result = Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(registry),
            Arc::new(NoopProvider),
        );
        assert!(matches!(
            result,
            Err(conductor_core::ConductorError::UnknownAgentKind(_))
        ));
    }

    #[tokio::test]
    async fn test_initial_status_is_idle_and_stopped() {
        let orch = orchestrator(OrchestratorConfig::default());
        let status = orch.status().await;
        assert!(!status.running);
        assert!(!status.paused);
        assert_eq!(status.current_phase, None);
        assert_eq!(status.queued, 0);
        assert_eq!(status.in_flight, 0);
    }

    #[tokio::test]
    async fn test_dispatch_while_stopped_queues_without_admission() {
        let orch = orchestrator(OrchestratorConfig::default());
        orch.dispatch(Task::new("add an endpoint")).await.unwrap();
        let status = orch.status().await;
        assert_eq!(status.queued, 1);
        assert_eq!(status.in_flight, 0);
    }

    #[tokio::test]
    async fn test_dispatch_queue_full() {
        let config = OrchestratorConfig {
            queue_capacity: 1,
            ..OrchestratorConfig::default()
        };
        let orch = orchestrator(config);
        orch.dispatch(Task::new("first")).await.unwrap();
        let err = orch.dispatch(Task::new("second")).await.unwrap_err();
        assert!(matches!(
            err,
            conductor_core::ConductorError::QueueFull { capacity: 1 }
        ));
        assert_eq!(orch.status().await.queued, 1);
    }

    #[tokio::test]
    async fn test_cancel_semantics_for_queued_and_unknown() {
        let orch = orchestrator(OrchestratorConfig::default());
        let id = orch.dispatch(Task::new("cancellable")).await.unwrap();
        assert!(orch.cancel_task(id).await);
        assert!(!orch.cancel_task(id).await);
        assert!(!orch.cancel_task(Uuid::new_v4()).await);
        assert_eq!(orch.status().await.queued, 0);
    }

    #[test]
    fn test_plurality_phase_tie_breaks_by_enumeration_order() {
        assert_eq!(plurality_phase(std::iter::empty()), None);
        assert_eq!(
            plurality_phase([Phase::Act, Phase::Act, Phase::Verify].into_iter()),
            Some(Phase::Act)
        );
        // Tie between Act and Verify: Act comes first in Phase::ALL.
        assert_eq!(
            plurality_phase([Phase::Verify, Phase::Act].into_iter()),
            Some(Phase::Act)
        );
        // Tie between Reason and Verify: Reason wins.
        assert_eq!(
            plurality_phase([Phase::Verify, Phase::Reason].into_iter()),
            Some(Phase::Reason)
        );
    }
}
