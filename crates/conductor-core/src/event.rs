use crate::task::Phase;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// A lifecycle or scheduling event published on the [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. `phase-started` or `task-completed`.
    pub event_type: String,
    /// The associated task id, or [`Event::ORCHESTRATOR`] for
    /// controller-level events.
    pub task_id: String,
    /// Best-known phase at the time of the event.
    pub phase: Option<Phase>,
    /// UTC timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Free-form payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    /// Sentinel task id for controller-level events.
    pub const ORCHESTRATOR: &'static str = "orchestrator";

    /// Published before each phase's work begins.
    pub const PHASE_STARTED: &'static str = "phase-started";
    /// Published when a task is accepted into the queue.
    pub const TASK_QUEUED: &'static str = "task-queued";
    /// Published when a task is admitted past the concurrency gate.
    pub const TASK_ADMITTED: &'static str = "task-admitted";
    /// Published when a task attempt succeeds.
    pub const TASK_COMPLETED: &'static str = "task-completed";
    /// Published when a failed attempt is re-enqueued.
    pub const TASK_RETRY: &'static str = "task-retry";
    /// Published when a task fails terminally.
    pub const TASK_FAILED: &'static str = "task-failed";
    /// Published when a queued task is cancelled.
    pub const TASK_CANCELLED: &'static str = "task-cancelled";
    /// Published when the orchestrator starts admitting work.
    pub const STARTED: &'static str = "orchestrator-started";
    /// Published when admissions are paused.
    pub const PAUSED: &'static str = "orchestrator-paused";
    /// Published when admissions resume.
    pub const RESUMED: &'static str = "orchestrator-resumed";
    /// Published once all in-flight work has settled after a stop.
    pub const STOPPED: &'static str = "orchestrator-stopped";

    /// Creates a task-scoped event.
    pub fn task(
        event_type: impl Into<String>,
        task_id: Uuid,
        phase: Option<Phase>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            task_id: task_id.to_string(),
            phase,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Creates a controller-level event.
    pub fn orchestrator(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            task_id: Self::ORCHESTRATOR.to_string(),
            phase: None,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Fan-out of lifecycle and scheduling events to zero or more subscribers.
///
/// Delivery is synchronous and best-effort: a panicking subscriber is caught
/// and logged, never propagated, and never prevents delivery to the
/// remaining subscribers.
pub struct EventBus {
    subscribers: Mutex<HashMap<u64, Handler>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a handler for all future events.
    pub fn subscribe<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, Arc::new(handler));
        SubscriberId(id)
    }

    /// Removes a handler. Returns true if it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().remove(&id.0).is_some()
    }

    /// Delivers an event to every current subscriber.
    pub fn publish(&self, event: &Event) {
        // Snapshot the handlers so a subscriber may unsubscribe re-entrantly
        // without deadlocking on the registry lock.
        let handlers: Vec<Handler> = self.subscribers.lock().values().cloned().collect();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(
                    event_type = %event.event_type,
                    task_id = %event.task_id,
                    "Event subscriber panicked; continuing delivery"
                );
            }
        }
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn test_event() -> Event {
        Event::task(
            Event::TASK_COMPLETED,
            Uuid::new_v4(),
            Some(Phase::Verify),
            serde_json::json!({}),
        )
    }

    #[test]
    fn test_subscribe_and_publish() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&test_event());
        bus.publish(&test_event());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&test_event());
        assert!(bus.unsubscribe(id));
        bus.publish(&test_event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(|_| panic!("subscriber bug"));
        let c = Arc::clone(&count);
        bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&test_event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_orchestrator_event_uses_sentinel_id() {
        let event = Event::orchestrator(Event::STARTED, serde_json::json!({"limit": 4}));
        assert_eq!(event.task_id, Event::ORCHESTRATOR);
        assert!(event.phase.is_none());
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let id = bus.subscribe(|_| {});
        bus.subscribe(|_| {});
        assert_eq!(bus.subscriber_count(), 2);
        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
