use crate::provider::{ModelProvider, ModelRequest};
use crate::registry::AgentSpec;
use conductor_core::{
    Artifact, ArtifactKind, ConductorError, Event, EventBus, ExecutionError, ExecutionMetrics,
    Phase, Task, TaskResult,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

/// Executes the four-phase lifecycle for one task against one agent spec.
///
/// Phases run strictly sequentially; any phase failure aborts the remaining
/// phases and yields a failure result carrying the originating phase. The
/// cycle has no knowledge of queueing, retries, or concurrency — it is a
/// single-attempt unit.
pub struct PhaseCycle {
    provider: Arc<dyn ModelProvider>,
    bus: Arc<EventBus>,
}

/// Outputs accumulated across the phases of one attempt.
#[derive(Default)]
struct CycleState {
    plan: String,
    output: String,
    learnings: Vec<String>,
    verification: String,
}

impl PhaseCycle {
    /// Creates a cycle executor over the given provider and event bus.
    pub fn new(provider: Arc<dyn ModelProvider>, bus: Arc<EventBus>) -> Self {
        Self { provider, bus }
    }

    /// Runs reason → act → reflect → verify for one attempt.
    ///
    /// Publishes a `phase-started` event and updates `progress` before each
    /// phase's work begins.
    pub async fn execute(
        &self,
        task: &Task,
        spec: &AgentSpec,
        progress: &watch::Sender<Phase>,
    ) -> TaskResult {
        let started = Instant::now();
        let mut metrics = ExecutionMetrics::default();
        let mut state = CycleState::default();

        for phase in Phase::ALL {
            let _ = progress.send(phase);
            self.bus.publish(&Event::task(
                Event::PHASE_STARTED,
                task.id,
                Some(phase),
                json!({ "agent": spec.kind.to_string(), "progress": phase.progress() }),
            ));
            info!(task_id = %task.id, agent = %spec.kind, phase = %phase, "Phase started");

            let phase_started = Instant::now();
            let request = build_request(phase, task, spec, &state);

            match self.provider.complete(request).await {
                Ok(response) => {
                    metrics.record_phase(phase, phase_started.elapsed().as_millis() as u64);
                    metrics.add_usage(response.tokens_in, response.tokens_out, response.cost_usd);
                    match phase {
                        Phase::Reason => state.plan = response.content,
                        Phase::Act => state.output = response.content,
                        Phase::Reflect => {
                            state.learnings = response
                                .content
                                .lines()
                                .map(str::trim)
                                .filter(|l| !l.is_empty())
                                .map(String::from)
                                .collect();
                        }
                        Phase::Verify => state.verification = response.content,
                    }
                }
                Err(e) => {
                    metrics.record_phase(phase, phase_started.elapsed().as_millis() as u64);
                    metrics.duration_ms = started.elapsed().as_millis() as u64;
                    warn!(task_id = %task.id, phase = %phase, error = %e, "Phase failed");

                    let recoverable = !matches!(e, ConductorError::Json(_));
                    return TaskResult::failure(
                        task.id,
                        ExecutionError::execution(phase, e.to_string(), recoverable),
                        metrics,
                    );
                }
            }
        }

        metrics.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            task_id = %task.id,
            agent = %spec.kind,
            duration_ms = metrics.duration_ms,
            "Phase cycle complete"
        );

        let mut result = TaskResult::success(task.id, state.output.clone(), metrics);
        result.artifacts = vec![
            Artifact::new(ArtifactKind::Plan, state.plan),
            Artifact::new(ArtifactKind::Output, state.output),
            Artifact::new(ArtifactKind::Verification, state.verification),
        ];
        result.learnings = state.learnings;
        result
    }
}

/// Builds the phase-specific request, threading earlier phase outputs
/// through later prompts.
fn build_request(phase: Phase, task: &Task, spec: &AgentSpec, state: &CycleState) -> ModelRequest {
    let context = context_block(task);
    let prompt = match phase {
        Phase::Reason => format!(
            "TASK:\n{}\n{context}\nAnalyze the task and produce a short, \
             numbered plan for accomplishing it.",
            task.description
        ),
        Phase::Act => format!(
            "TASK:\n{}\n{context}\nPLAN:\n{}\n\nCarry out the plan and \
             produce the deliverable.",
            task.description, state.plan
        ),
        Phase::Reflect => format!(
            "TASK:\n{}\n\nOUTPUT:\n{}\n\nReview the output. List one \
             learning per line: what worked, what to improve next time.",
            task.description, state.output
        ),
        Phase::Verify => format!(
            "TASK:\n{}\n\nOUTPUT:\n{}\n\nVerify that the output satisfies \
             the task. Report any gaps.",
            task.description, state.output
        ),
    };

    // Only the act phase gets the tool schema; the other phases are
    // text-only reasoning over prior outputs.
    let tool_schema = match phase {
        Phase::Act => Some(spec.tool_schema.clone()),
        _ => None,
    };

    ModelRequest {
        system_prompt: spec.system_prompt.clone(),
        prompt,
        tool_schema,
        phase,
    }
}

fn context_block(task: &Task) -> String {
    let mut block = String::new();
    if let Some(lang) = &task.context.language {
        block.push_str(&format!("LANGUAGE: {lang}\n"));
    }
    if let Some(framework) = &task.context.framework {
        block.push_str(&format!("FRAMEWORK: {framework}\n"));
    }
    if !task.context.files.is_empty() {
        block.push_str(&format!("FILES:\n{}\n", task.context.files.join("\n")));
    }
    block
}
