use crate::task::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Kind of artifact produced during a phase cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// The plan produced by the reason phase.
    Plan,
    /// The main output of the act phase.
    Output,
    /// The verification report from the verify phase.
    Verification,
}

/// An artifact produced by a task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// What kind of artifact this is.
    pub kind: ArtifactKind,
    /// The artifact content.
    pub content: String,
    /// Optional file path the artifact targets.
    pub file_path: Option<String>,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Creates a new artifact with the given kind and content.
    pub fn new(kind: ArtifactKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            file_path: None,
            created_at: Utc::now(),
        }
    }

    /// Attaches a target file path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}

/// Token, cost, and timing counters aggregated over one attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Prompt tokens consumed across all phases.
    pub tokens_in: u64,
    /// Completion tokens consumed across all phases.
    pub tokens_out: u64,
    /// Total provider cost in USD.
    pub cost_usd: f64,
    /// Wall-clock duration of the attempt in milliseconds.
    pub duration_ms: u64,
    /// Per-phase wall-clock timings in milliseconds, keyed by phase name.
    #[serde(default)]
    pub phase_timings_ms: HashMap<String, u64>,
}

impl ExecutionMetrics {
    /// Records the duration of one phase.
    pub fn record_phase(&mut self, phase: Phase, duration_ms: u64) {
        self.phase_timings_ms.insert(phase.to_string(), duration_ms);
    }

    /// Adds token and cost usage from one provider call.
    pub fn add_usage(&mut self, tokens_in: u64, tokens_out: u64, cost_usd: f64) {
        self.tokens_in += tokens_in;
        self.tokens_out += tokens_out;
        self.cost_usd += cost_usd;
    }
}

/// An error recorded against a task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Machine-readable code, e.g. `TIMEOUT` or `EXECUTION_ERROR`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// The phase in which the error originated, when known.
    pub phase: Option<Phase>,
    /// Whether the scheduler may retry the attempt.
    pub recoverable: bool,
}

impl ExecutionError {
    /// Error code for attempts that exceeded their deadline.
    pub const TIMEOUT: &'static str = "TIMEOUT";
    /// Error code for phase-cycle failures.
    pub const EXECUTION_ERROR: &'static str = "EXECUTION_ERROR";

    /// Creates a timeout error. Always recoverable.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self {
            code: Self::TIMEOUT.to_string(),
            message: format!("attempt exceeded its {timeout_ms}ms deadline"),
            phase: None,
            recoverable: true,
        }
    }

    /// Creates an execution error originating in the given phase.
    pub fn execution(phase: Phase, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            code: Self::EXECUTION_ERROR.to_string(),
            message: message.into(),
            phase: Some(phase),
            recoverable,
        }
    }
}

/// Terminal record for one task attempt.
///
/// Appended to either the completed set or the failed set, never both.
/// Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task this result belongs to.
    pub task_id: Uuid,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// The output payload (verify-phase annotated act output on success).
    pub output: String,
    /// Artifacts produced across the phases.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Learnings extracted by the reflect phase.
    #[serde(default)]
    pub learnings: Vec<String>,
    /// Aggregated token, cost, and timing counters.
    pub metrics: ExecutionMetrics,
    /// Errors recorded against the attempt. Non-empty iff `success` is false.
    #[serde(default)]
    pub errors: Vec<ExecutionError>,
    /// Total number of attempts made for this task, including this one.
    pub attempts: u32,
    /// UTC timestamp when the result was produced.
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    /// Creates a success result for the given task.
    pub fn success(task_id: Uuid, output: impl Into<String>, metrics: ExecutionMetrics) -> Self {
        Self {
            task_id,
            success: true,
            output: output.into(),
            artifacts: Vec::new(),
            learnings: Vec::new(),
            metrics,
            errors: Vec::new(),
            attempts: 1,
            finished_at: Utc::now(),
        }
    }

    /// Creates a failure result carrying the given error.
    pub fn failure(task_id: Uuid, error: ExecutionError, metrics: ExecutionMetrics) -> Self {
        Self {
            task_id,
            success: false,
            output: String::new(),
            artifacts: Vec::new(),
            learnings: Vec::new(),
            metrics,
            errors: vec![error],
            attempts: 1,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_creation() {
        let artifact = Artifact::new(ArtifactKind::Output, "fn main() {}").with_path("src/main.rs");
        assert_eq!(artifact.kind, ArtifactKind::Output);
        assert_eq!(artifact.file_path.as_deref(), Some("src/main.rs"));
    }

    #[test]
    fn test_metrics_accumulation() {
        let mut metrics = ExecutionMetrics::default();
        metrics.add_usage(100, 50, 0.002);
        metrics.add_usage(200, 80, 0.003);
        assert_eq!(metrics.tokens_in, 300);
        assert_eq!(metrics.tokens_out, 130);
        assert!((metrics.cost_usd - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_phase_timings() {
        let mut metrics = ExecutionMetrics::default();
        metrics.record_phase(Phase::Reason, 120);
        metrics.record_phase(Phase::Act, 450);
        assert_eq!(metrics.phase_timings_ms.get("reason"), Some(&120));
        assert_eq!(metrics.phase_timings_ms.get("act"), Some(&450));
    }

    #[test]
    fn test_timeout_error_is_recoverable() {
        let err = ExecutionError::timeout(300_000);
        assert_eq!(err.code, ExecutionError::TIMEOUT);
        assert!(err.recoverable);
        assert!(err.phase.is_none());
    }

    #[test]
    fn test_execution_error_carries_phase() {
        let err = ExecutionError::execution(Phase::Act, "provider unavailable", true);
        assert_eq!(err.code, ExecutionError::EXECUTION_ERROR);
        assert_eq!(err.phase, Some(Phase::Act));
    }

    #[test]
    fn test_failure_result_has_errors() {
        let err = ExecutionError::execution(Phase::Verify, "bad output", false);
        let result = TaskResult::failure(Uuid::new_v4(), err, ExecutionMetrics::default());
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_result_serialization_round_trip() {
        let result = TaskResult::success(Uuid::new_v4(), "done", ExecutionMetrics::default());
        let json = serde_json::to_string(&result).unwrap();
        let parsed: TaskResult = serde_json::from_str(&json).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.task_id, result.task_id);
    }
}
