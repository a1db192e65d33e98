use conductor_core::{AgentKind, ConductorError, ConductorResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::info;

/// Configuration for one agent kind: the capability the phase cycle runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// The kind this spec handles.
    pub kind: AgentKind,
    /// System prompt used for every phase of the cycle.
    pub system_prompt: String,
    /// Tool schema handed to the act phase.
    pub tool_schema: serde_json::Value,
}

/// Central registry mapping agent kinds to their specs.
pub struct AgentRegistry {
    agents: HashMap<AgentKind, AgentSpec>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Registers a spec, replacing any existing spec for the same kind.
    pub fn register(&mut self, spec: AgentSpec) {
        info!(kind = %spec.kind, "Registered agent");
        self.agents.insert(spec.kind, spec);
    }

    /// Looks up the spec for a kind.
    ///
    /// An unregistered kind is a configuration error, not a retryable
    /// failure.
    pub fn get(&self, kind: AgentKind) -> ConductorResult<&AgentSpec> {
        self.agents
            .get(&kind)
            .ok_or_else(|| ConductorError::UnknownAgentKind(kind.to_string()))
    }

    /// Number of registered agent kinds.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a registry populated with the default spec for every concrete
/// agent kind.
pub fn default_agents() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for kind in AgentKind::CONCRETE {
        registry.register(AgentSpec {
            kind,
            system_prompt: system_prompt_for(kind).to_string(),
            tool_schema: tool_schema_for(kind),
        });
    }
    registry
}

fn system_prompt_for(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Frontend => {
            "You are a frontend engineer. You build UI components and \
             client-side logic. Keep components small, accessible, and \
             consistent with the existing design system."
        }
        AgentKind::Backend => {
            "You are a backend engineer. You implement APIs, services, and \
             server-side logic. Follow the project's error-handling and \
             logging conventions; never swallow failures silently."
        }
        AgentKind::Database => {
            "You are a database engineer. You design schemas, write queries, \
             and author migrations. Every migration must be reversible and \
             every query indexed for its access pattern."
        }
        AgentKind::Devops => {
            "You are a DevOps engineer. You maintain CI/CD pipelines and \
             deployment infrastructure. Prefer declarative configuration and \
             keep secrets out of source control."
        }
        AgentKind::Testing => {
            "You are a test engineer. You write unit and integration tests \
             covering happy paths, edge cases, and error conditions, with \
             descriptive names."
        }
        AgentKind::SecurityReview => {
            "You are a security reviewer. You audit code for OWASP Top 10 \
             vulnerabilities, unsafe input handling, and privilege escalation \
             paths. Flag anything requiring human sign-off."
        }
        AgentKind::CodeReview => {
            "You are a code reviewer. You check correctness, readability, \
             and adherence to project conventions. Point at concrete lines; \
             avoid style nitpicks the linter already covers."
        }
        AgentKind::Documentation => {
            "You are a technical writer. You produce accurate, concise \
             documentation aimed at a reader with zero context."
        }
        AgentKind::Refactoring => {
            "You are a refactoring specialist. You restructure code without \
             changing observable behavior, in small verifiable steps."
        }
        AgentKind::Debugging => {
            "You are a debugging specialist. You reproduce the failure, \
             isolate the root cause, and fix it with the smallest safe \
             change. State the cause before the fix."
        }
        AgentKind::Planning => {
            "You are a planning specialist. You decompose work into \
             concrete, independently verifiable tasks with explicit \
             dependencies and estimates."
        }
        AgentKind::Infer => "",
    }
}

fn tool_schema_for(kind: AgentKind) -> serde_json::Value {
    let tools: &[&str] = match kind {
        AgentKind::Frontend | AgentKind::Backend | AgentKind::Database => {
            &["read_file", "write_file", "run_tests"]
        }
        AgentKind::Devops => &["read_file", "write_file", "run_command"],
        AgentKind::Testing => &["read_file", "write_file", "run_tests"],
        AgentKind::SecurityReview | AgentKind::CodeReview => &["read_file", "search_code"],
        AgentKind::Documentation => &["read_file", "write_file"],
        AgentKind::Refactoring | AgentKind::Debugging => {
            &["read_file", "write_file", "search_code", "run_tests"]
        }
        AgentKind::Planning | AgentKind::Infer => &["read_file", "search_code"],
    };
    json!({ "tools": tools })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_agents_cover_all_concrete_kinds() {
        let registry = default_agents();
        assert_eq!(registry.agent_count(), AgentKind::CONCRETE.len());
        for kind in AgentKind::CONCRETE {
            assert!(registry.get(kind).is_ok(), "missing spec for {kind}");
        }
    }

    #[test]
    fn test_infer_kind_is_not_registered() {
        let registry = default_agents();
        let err = registry.get(AgentKind::Infer).unwrap_err();
        assert!(matches!(
            err,
            conductor_core::ConductorError::UnknownAgentKind(_)
        ));
    }

    #[test]
    fn test_empty_registry_rejects_lookup() {
        let registry = AgentRegistry::new();
        assert!(registry.get(AgentKind::Backend).is_err());
    }

    #[test]
    fn test_all_specs_have_prompts_and_tools() {
        let registry = default_agents();
        for kind in AgentKind::CONCRETE {
            let spec = registry.get(kind).unwrap();
            assert!(!spec.system_prompt.is_empty());
            assert!(spec.tool_schema["tools"].is_array());
        }
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = AgentRegistry::new();
        registry.register(AgentSpec {
            kind: AgentKind::Backend,
            system_prompt: "v1".to_string(),
            tool_schema: json!({"tools": []}),
        });
        registry.register(AgentSpec {
            kind: AgentKind::Backend,
            system_prompt: "v2".to_string(),
            tool_schema: json!({"tools": []}),
        });
        assert_eq!(registry.agent_count(), 1);
        assert_eq!(registry.get(AgentKind::Backend).unwrap().system_prompt, "v2");
    }
}
