use conductor_core::{AgentKind, Task};

/// Ordered keyword rules, grouped by category. Evaluation is top-to-bottom
/// and the first matching pattern wins, so overlapping keywords (a
/// description mentioning both "test" and "database") resolve to the
/// earlier category. Reordering these rules changes selection behavior.
const RULES: &[(&[&str], AgentKind)] = &[
    // Engineering
    (
        &["frontend", "ui", "component", "css", "styling", "react"],
        AgentKind::Frontend,
    ),
    (
        &["database", "schema", "migration", "sql", "query"],
        AgentKind::Database,
    ),
    (
        &["deploy", "pipeline", "docker", "kubernetes", "infrastructure", "ci/cd"],
        AgentKind::Devops,
    ),
    (
        &["api", "endpoint", "server", "backend", "service"],
        AgentKind::Backend,
    ),
    // Quality
    (
        &["security", "vulnerability", "exploit", "penetration"],
        AgentKind::SecurityReview,
    ),
    (&["test", "coverage", "assertion"], AgentKind::Testing),
    (&["review", "pull request", "pr feedback"], AgentKind::CodeReview),
    // Support
    (
        &["document", "readme", "docs", "changelog"],
        AgentKind::Documentation,
    ),
    (
        &["refactor", "restructure", "clean up", "simplify"],
        AgentKind::Refactoring,
    ),
    (
        &["bug", "fix", "debug", "crash", "regression"],
        AgentKind::Debugging,
    ),
    // Planning
    (
        &["plan", "roadmap", "estimate", "break down", "decompose"],
        AgentKind::Planning,
    ),
];

/// Maps a task to the agent kind that should handle it.
///
/// An explicit, non-infer kind is returned unchanged. Otherwise the task
/// description is scanned (case-insensitively) against [`RULES`], defaulting
/// to [`AgentKind::Backend`] when nothing matches.
///
/// Pure and deterministic: no I/O, no state.
pub fn select_agent_kind(task: &Task) -> AgentKind {
    if task.kind != AgentKind::Infer {
        return task.kind;
    }

    let description = task.description.to_lowercase();
    for (keywords, kind) in RULES {
        if keywords.iter().any(|k| description.contains(k)) {
            return *kind;
        }
    }

    AgentKind::Backend
}
