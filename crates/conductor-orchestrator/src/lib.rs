//! Task scheduling and execution orchestration.
//!
//! Queued tasks are scored, aged, and admitted through a bounded
//! concurrency gate; each admitted task runs a four-phase agent cycle
//! raced against a deadline, with failed attempts re-enqueued under a
//! bounded retry policy.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Admission control, timeout enforcement, and retry policy.
//! - [`PriorityQueue`] — Score-ordered, capacity-bounded task queue with age boosts.
//! - [`OrchestratorConfig`] — Validated scheduler tunables.
//! - [`select_agent_kind`] — Keyword-based agent selection for unannotated tasks.

/// Scheduler tunables and validation.
pub mod config;
/// Score-ordered task queue with aging.
pub mod queue;
/// Admission control, execution slots, and retry policy.
pub mod scheduler;
/// Keyword-based agent kind selection.
pub mod selector;

pub use config::OrchestratorConfig;
pub use queue::{PriorityQueue, QueueItem};
pub use scheduler::{Orchestrator, OrchestratorStatus, SlotInfo};
pub use selector::select_agent_kind;
