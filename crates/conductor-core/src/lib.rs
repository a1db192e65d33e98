//! Core types and error definitions for the Conductor scheduler.
//!
//! This crate provides the foundational types shared across all Conductor
//! crates: the task model, terminal results, the event envelope and bus,
//! and the unified error enum.
//!
//! # Main types
//!
//! - [`ConductorError`] — Unified error enum for all Conductor subsystems.
//! - [`ConductorResult`] — Convenience alias for `Result<T, ConductorError>`.
//! - [`Task`] — A unit of work submitted to the scheduler.
//! - [`Phase`] — The fixed four-phase execution lifecycle.
//! - [`TaskResult`] — The terminal record produced by one task attempt.
//! - [`EventBus`] — Best-effort fan-out of lifecycle and scheduling events.

/// Lifecycle and scheduling event envelope plus the event bus.
pub mod event;
/// Terminal result, artifact, metrics, and execution error types.
pub mod result;
/// Task identity, context, priority tiers, agent kinds, and phases.
pub mod task;

pub use event::{Event, EventBus, SubscriberId};
pub use result::{Artifact, ArtifactKind, ExecutionError, ExecutionMetrics, TaskResult};
pub use task::{AgentKind, Phase, PriorityTier, Task, TaskContext, TaskStatus};

/// Top-level error type for the Conductor scheduler.
///
/// Queue-capacity and unknown-kind errors surface synchronously to callers;
/// execution and timeout errors are converted by the scheduler into
/// retry-or-terminal-failure results and never escape the admission loop.
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// Dispatch rejected because the queue is at capacity.
    #[error("Queue full: capacity {capacity} reached")]
    QueueFull {
        /// The configured queue capacity that was hit.
        capacity: usize,
    },

    /// A task attempt exceeded its deadline. Retryable.
    #[error("Task attempt timed out after {timeout_ms}ms")]
    Timeout {
        /// The configured per-task timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The phase cycle itself failed. Retryable up to the configured limit.
    #[error("Execution error in {phase} phase: {message}")]
    Execution {
        /// The phase in which the failure originated.
        phase: task::Phase,
        /// Human-readable failure description.
        message: String,
    },

    /// No agent is registered for the requested kind. Fatal, not retryable.
    #[error("Unknown agent kind: {0}")]
    UnknownAgentKind(String),

    /// An error in configuration validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience `Result` alias using [`ConductorError`].
pub type ConductorResult<T> = Result<T, ConductorError>;
