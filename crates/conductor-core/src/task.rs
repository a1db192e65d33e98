use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named category of task handler.
///
/// Each kind associates a system prompt and tool schema via the agent
/// registry. `Infer` defers the choice to the agent selector, which scans
/// the task description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    /// UI, components, styling, client-side work.
    Frontend,
    /// APIs, services, general server-side work. Also the inference default.
    Backend,
    /// Schemas, queries, migrations.
    Database,
    /// CI/CD, deployment, infrastructure.
    Devops,
    /// Test authoring and coverage work.
    Testing,
    /// Vulnerability and security analysis.
    SecurityReview,
    /// Code quality review.
    CodeReview,
    /// Docs, readmes, and comments.
    Documentation,
    /// Restructuring without behavior change.
    Refactoring,
    /// Bug hunting and fixes.
    Debugging,
    /// Decomposition and estimation.
    Planning,
    /// No explicit kind declared; the selector infers one.
    Infer,
}

impl AgentKind {
    /// Every concrete kind, i.e. everything the selector may resolve to.
    /// Excludes [`AgentKind::Infer`].
    pub const CONCRETE: [AgentKind; 11] = [
        AgentKind::Frontend,
        AgentKind::Backend,
        AgentKind::Database,
        AgentKind::Devops,
        AgentKind::Testing,
        AgentKind::SecurityReview,
        AgentKind::CodeReview,
        AgentKind::Documentation,
        AgentKind::Refactoring,
        AgentKind::Debugging,
        AgentKind::Planning,
    ];
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentKind::Frontend => "frontend",
            AgentKind::Backend => "backend",
            AgentKind::Database => "database",
            AgentKind::Devops => "devops",
            AgentKind::Testing => "testing",
            AgentKind::SecurityReview => "security-review",
            AgentKind::CodeReview => "code-review",
            AgentKind::Documentation => "documentation",
            AgentKind::Refactoring => "refactoring",
            AgentKind::Debugging => "debugging",
            AgentKind::Planning => "planning",
            AgentKind::Infer => "infer",
        };
        write!(f, "{name}")
    }
}

/// Declared urgency tier of a task. Feeds the base priority score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    /// Admitted before everything else.
    Critical,
    /// Elevated priority.
    High,
    /// The default tier.
    Medium,
    /// Background work.
    Low,
}

impl PriorityTier {
    /// Base priority score contributed by this tier.
    pub fn base_score(self) -> f64 {
        match self {
            PriorityTier::Critical => 100.0,
            PriorityTier::High => 75.0,
            PriorityTier::Medium => 50.0,
            PriorityTier::Low => 25.0,
        }
    }
}

/// Lifecycle status of a task, mutated only by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the priority queue.
    Queued,
    /// Admitted past the concurrency gate and executing.
    Running,
    /// Finished with a success result.
    Completed,
    /// Retries exhausted or disabled; terminally failed.
    Failed {
        /// The last recorded error message.
        reason: String,
    },
    /// Removed from the queue before admission.
    Cancelled,
}

/// One stage of the fixed four-phase execution lifecycle.
///
/// Phases run strictly sequentially within an attempt: no phase begins
/// before the prior one settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Analyze the task and plan an approach.
    Reason,
    /// Carry out the plan; produces the main artifact.
    Act,
    /// Review the work and extract learnings.
    Reflect,
    /// Check the output against the task before settling.
    Verify,
}

impl Phase {
    /// All phases in execution order. Also the tie-break order for
    /// plurality-phase status reporting.
    pub const ALL: [Phase; 4] = [Phase::Reason, Phase::Act, Phase::Reflect, Phase::Verify];

    /// Monotonic progress fraction while this phase is running.
    /// Display heuristic only; never used for correctness decisions.
    pub fn progress(self) -> f64 {
        match self {
            Phase::Reason => 0.25,
            Phase::Act => 0.50,
            Phase::Reflect => 0.75,
            Phase::Verify => 0.90,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Reason => write!(f, "reason"),
            Phase::Act => write!(f, "act"),
            Phase::Reflect => write!(f, "reflect"),
            Phase::Verify => write!(f, "verify"),
        }
    }
}

/// Context bundle attached to a task: what the handler gets to look at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    /// Files relevant to the task. More than 5 entries counts as complex
    /// and costs a priority penalty.
    #[serde(default)]
    pub files: Vec<String>,
    /// Workspace root the files are relative to.
    #[serde(default)]
    pub workspace_root: Option<String>,
    /// Language hint (e.g. "rust").
    #[serde(default)]
    pub language: Option<String>,
    /// Framework hint (e.g. "axum").
    #[serde(default)]
    pub framework: Option<String>,
}

/// A unit of work submitted to the scheduler.
///
/// Owned by the scheduler once dispatched; immutable except for
/// `status`, which only the scheduler mutates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identity. Distinct from per-attempt execution ids.
    pub id: Uuid,
    /// Free-text description of the work.
    pub description: String,
    /// Declared handler kind, or `Infer` to let the selector decide.
    pub kind: AgentKind,
    /// Declared urgency tier.
    pub priority: PriorityTier,
    /// Caller confidence in the task description, in [0, 1].
    pub confidence: f64,
    /// Context bundle handed to the phase cycle.
    #[serde(default)]
    pub context: TaskContext,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// UTC timestamp of task creation.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a medium-priority task with an inferred kind.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            kind: AgentKind::Infer,
            priority: PriorityTier::Medium,
            confidence: 0.5,
            context: TaskContext::default(),
            status: TaskStatus::Queued,
            created_at: Utc::now(),
        }
    }

    /// Sets an explicit agent kind.
    pub fn with_kind(mut self, kind: AgentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the priority tier.
    pub fn with_priority(mut self, priority: PriorityTier) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the confidence score, clamped to [0, 1].
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Sets the context bundle.
    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }
}
