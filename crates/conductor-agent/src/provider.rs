use async_trait::async_trait;
use conductor_core::{ConductorResult, Phase};
use serde::{Deserialize, Serialize};

/// A structured request to the underlying language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The agent's system prompt.
    pub system_prompt: String,
    /// The phase-specific user prompt.
    pub prompt: String,
    /// The agent's declared tool schema, when the phase uses tools.
    pub tool_schema: Option<serde_json::Value>,
    /// The phase issuing this request.
    pub phase: Phase,
}

/// The response produced by a [`ModelProvider`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Generated text content.
    pub content: String,
    /// Prompt tokens consumed.
    pub tokens_in: u64,
    /// Completion tokens produced.
    pub tokens_out: u64,
    /// Cost of the call in USD.
    pub cost_usd: f64,
}

/// Trait for the language-model collaborator.
///
/// The scheduler treats this as an opaque async call with no retry logic of
/// its own; retries are a scheduler-level policy. Failures propagate as
/// errors and become phase-cycle failures.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Produce a response for the given request.
    async fn complete(&self, request: ModelRequest) -> ConductorResult<ModelResponse>;
}
