//! Agent-side building blocks for the Conductor scheduler.
//!
//! # Main types
//!
//! - [`ModelProvider`] — Opaque async collaborator that turns a request into
//!   a response, consuming tokens and cost.
//! - [`AgentRegistry`] — Lookup from agent kind to system prompt and tool
//!   schema.
//! - [`PhaseCycle`] — Executes the four-phase lifecycle for one task attempt.

/// The four-phase single-attempt executor.
pub mod cycle;
/// Model provider collaborator trait and request/response types.
pub mod provider;
/// Agent-kind registry and default agent specs.
pub mod registry;

pub use cycle::PhaseCycle;
pub use provider::{ModelProvider, ModelRequest, ModelResponse};
pub use registry::{default_agents, AgentRegistry, AgentSpec};
