use chrono::{DateTime, Utc};
use conductor_core::{ConductorError, ConductorResult, Task};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Points added to the priority score per elapsed age-boost threshold.
const AGE_BOOST_STEP: f64 = 5.0;

/// A queued task plus its scheduling bookkeeping.
///
/// The attempt counter only increases; `enqueued_at` is the original
/// enqueue time and survives retry requeues so age boosts and terminal
/// wall-time measurements see the full wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// The wrapped task.
    pub task: Task,
    /// Derived priority score; recomputed when age boosts are applied.
    pub priority: f64,
    /// When the task was first enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed attempts so far.
    pub attempts: u32,
    /// The most recent attempt's error message, if any.
    pub last_error: Option<String>,
    /// Insertion sequence, the tie-break for equal scores.
    seq: u64,
}

/// An ordered, capacity-bounded collection of queued tasks.
///
/// Items are kept sorted descending by priority score with a stable
/// insertion-order tie-break: equal-score items are never reordered.
pub struct PriorityQueue {
    items: Vec<QueueItem>,
    capacity: usize,
    next_seq: u64,
}

impl PriorityQueue {
    /// Creates an empty queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity,
            next_seq: 0,
        }
    }

    /// Computes the priority score for a task: tier base + confidence
    /// bonus − complexity penalty.
    pub fn compute_priority(task: &Task) -> f64 {
        let base = task.priority.base_score();
        let confidence_bonus = if task.confidence >= 0.9 {
            20.0
        } else if task.confidence >= 0.6 {
            10.0
        } else {
            0.0
        };
        let complexity_penalty = if task.context.files.len() > 5 { 10.0 } else { 0.0 };
        base + confidence_bonus - complexity_penalty
    }

    /// Inserts a task, returning its computed priority score.
    ///
    /// Fails with [`ConductorError::QueueFull`] at capacity; the task is
    /// not admitted and the queue is unchanged.
    pub fn enqueue(&mut self, task: Task) -> ConductorResult<f64> {
        if self.items.len() >= self.capacity {
            return Err(ConductorError::QueueFull {
                capacity: self.capacity,
            });
        }
        let priority = Self::compute_priority(&task);
        let item = QueueItem {
            task,
            priority,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.items.push(item);
        self.sort();
        Ok(priority)
    }

    /// Re-inserts an item after a failed attempt, preserving its attempt
    /// history and original enqueue time.
    ///
    /// Retries must never be lost, so this bypasses the capacity check;
    /// capacity only gates fresh dispatches. The item gets a fresh
    /// insertion sequence: among equal scores it lines up behind tasks
    /// already waiting.
    pub fn requeue(&mut self, mut item: QueueItem) {
        item.priority = Self::compute_priority(&item.task);
        item.seq = self.next_seq;
        self.next_seq += 1;
        self.items.push(item);
        self.sort();
    }

    /// Removes and returns the highest-priority item, or `None` when empty.
    pub fn dequeue_highest(&mut self) -> Option<QueueItem> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Recomputes scores with an age boost of `5 * floor(age / threshold)`
    /// for every item that has waited longer than `threshold_ms`, then
    /// re-sorts.
    ///
    /// Scores are recomputed from the base rather than accumulated, so
    /// repeated calls are idempotent for a fixed age and monotonic as age
    /// grows.
    pub fn boost_aged(&mut self, threshold_ms: u64) {
        self.boost_aged_at(threshold_ms, Utc::now());
    }

    fn boost_aged_at(&mut self, threshold_ms: u64, now: DateTime<Utc>) {
        if threshold_ms == 0 {
            return;
        }
        for item in &mut self.items {
            let age_ms = (now - item.enqueued_at).num_milliseconds().max(0) as u64;
            let steps = age_ms / threshold_ms;
            item.priority = Self::compute_priority(&item.task) + AGE_BOOST_STEP * steps as f64;
        }
        self.sort();
    }

    /// Removes a task by id, returning the item if it was queued.
    pub fn remove(&mut self, task_id: Uuid) -> Option<QueueItem> {
        let index = self.items.iter().position(|i| i.task.id == task_id)?;
        Some(self.items.remove(index))
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Stable sort: equal-score items keep ascending insertion sequence.
    fn sort(&mut self) {
        self.items.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.seq.cmp(&b.seq))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use conductor_core::{PriorityTier, TaskContext};

    fn task(tier: PriorityTier, confidence: f64) -> Task {
        Task::new("queued work")
            .with_priority(tier)
            .with_confidence(confidence)
    }

    #[test]
    fn test_priority_score_components() {
        // critical base 100 + high-confidence bonus 20
        let t = task(PriorityTier::Critical, 0.95);
        assert!((PriorityQueue::compute_priority(&t) - 120.0).abs() < f64::EPSILON);

        // medium base 50 + mid-confidence bonus 10
        let t = task(PriorityTier::Medium, 0.7);
        assert!((PriorityQueue::compute_priority(&t) - 60.0).abs() < f64::EPSILON);

        // low base 25, no bonus, complexity penalty -10
        let t = task(PriorityTier::Low, 0.3).with_context(TaskContext {
            files: (0..6).map(|i| format!("src/f{i}.rs")).collect(),
            ..TaskContext::default()
        });
        assert!((PriorityQueue::compute_priority(&t) - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dequeue_order_by_score() {
        let mut queue = PriorityQueue::new(10);
        let low = task(PriorityTier::Low, 0.5);
        let critical = task(PriorityTier::Critical, 0.5);
        let medium = task(PriorityTier::Medium, 0.5);
        let (low_id, critical_id, medium_id) = (low.id, critical.id, medium.id);

        queue.enqueue(low).unwrap();
        queue.enqueue(critical).unwrap();
        queue.enqueue(medium).unwrap();

        assert_eq!(queue.dequeue_highest().unwrap().task.id, critical_id);
        assert_eq!(queue.dequeue_highest().unwrap().task.id, medium_id);
        assert_eq!(queue.dequeue_highest().unwrap().task.id, low_id);
        assert!(queue.dequeue_highest().is_none());
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let mut queue = PriorityQueue::new(10);
        let mut ids = Vec::new();
        for _ in 0..5 {
            let t = task(PriorityTier::Medium, 0.5);
            ids.push(t.id);
            queue.enqueue(t).unwrap();
        }
        queue.boost_aged(60_000); // no-op boost must not reorder ties
        for id in ids {
            assert_eq!(queue.dequeue_highest().unwrap().task.id, id);
        }
    }

    #[test]
    fn test_queue_full_rejects_without_change() {
        let mut queue = PriorityQueue::new(2);
        queue.enqueue(task(PriorityTier::Medium, 0.5)).unwrap();
        queue.enqueue(task(PriorityTier::Medium, 0.5)).unwrap();

        let err = queue.enqueue(task(PriorityTier::Critical, 0.9)).unwrap_err();
        assert!(matches!(err, ConductorError::QueueFull { capacity: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_age_boost_steps_and_monotonicity() {
        let mut queue = PriorityQueue::new(10);
        queue.enqueue(task(PriorityTier::Low, 0.5)).unwrap();
        let enqueued_at = queue.items[0].enqueued_at;
        let base = queue.items[0].priority;

        // 2.5 thresholds of age → floor = 2 steps → +10
        queue.boost_aged_at(1_000, enqueued_at + Duration::milliseconds(2_500));
        let boosted = queue.items[0].priority;
        assert!((boosted - (base + 10.0)).abs() < f64::EPSILON);

        // Re-running with a larger elapsed time never decreases the score.
        queue.boost_aged_at(1_000, enqueued_at + Duration::milliseconds(4_100));
        assert!(queue.items[0].priority >= boosted);

        // Idempotent for a fixed age: not accumulated across calls.
        queue.boost_aged_at(1_000, enqueued_at + Duration::milliseconds(4_100));
        assert!((queue.items[0].priority - (base + 20.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_age_boost_can_overtake_higher_tier() {
        let mut queue = PriorityQueue::new(10);
        let old_low = task(PriorityTier::Low, 0.5); // base 25
        let fresh_medium = task(PriorityTier::Medium, 0.5); // base 50
        let old_id = old_low.id;
        queue.enqueue(old_low).unwrap();
        queue.enqueue(fresh_medium).unwrap();

        let now = Utc::now();
        // Age the low task by six thresholds: 25 + 30 = 55 > 50.
        queue
            .items
            .iter_mut()
            .find(|i| i.task.id == old_id)
            .unwrap()
            .enqueued_at = now - Duration::milliseconds(6_000);
        queue.boost_aged_at(1_000, now);

        assert_eq!(queue.dequeue_highest().unwrap().task.id, old_id);
    }

    #[test]
    fn test_remove_queued_task() {
        let mut queue = PriorityQueue::new(10);
        let t = task(PriorityTier::Medium, 0.5);
        let id = t.id;
        queue.enqueue(t).unwrap();

        assert!(queue.remove(id).is_some());
        assert!(queue.remove(id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_requeue_preserves_history_and_bypasses_capacity() {
        let mut queue = PriorityQueue::new(1);
        queue.enqueue(task(PriorityTier::Medium, 0.5)).unwrap();
        let mut item = queue.dequeue_highest().unwrap();
        item.attempts = 2;
        item.last_error = Some("provider unavailable".to_string());
        let original_enqueue = item.enqueued_at;

        // Fill the freed slot, then requeue the failed item past capacity.
        queue.enqueue(task(PriorityTier::Medium, 0.5)).unwrap();
        queue.requeue(item);

        assert_eq!(queue.len(), 2);
        // Equal score: the requeued item sits behind the fresh one.
        assert_eq!(queue.dequeue_highest().unwrap().attempts, 0);
        let requeued = queue.dequeue_highest().unwrap();
        assert_eq!(requeued.attempts, 2);
        assert_eq!(requeued.enqueued_at, original_enqueue);
    }
}
