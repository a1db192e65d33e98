use conductor_core::{ConductorError, ConductorResult};
use serde::{Deserialize, Serialize};

/// Externally supplied orchestrator tunables, validated at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of in-flight task attempts.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum number of queued tasks; dispatch beyond this fails.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Per-task attempt deadline in milliseconds.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// Whether failed attempts are re-enqueued.
    #[serde(default = "default_retry_failed")]
    pub retry_failed: bool,
    /// Total attempts allowed per task (original attempt included).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Whether queued tasks gain priority as they age.
    #[serde(default = "default_age_boost_enabled")]
    pub age_boost_enabled: bool,
    /// Age-boost threshold in milliseconds.
    #[serde(default = "default_age_boost_threshold_ms")]
    pub age_boost_threshold_ms: u64,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    100
}

fn default_task_timeout_ms() -> u64 {
    300_000
}

fn default_retry_failed() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_age_boost_enabled() -> bool {
    true
}

fn default_age_boost_threshold_ms() -> u64 {
    60_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_capacity: default_queue_capacity(),
            task_timeout_ms: default_task_timeout_ms(),
            retry_failed: default_retry_failed(),
            max_retries: default_max_retries(),
            age_boost_enabled: default_age_boost_enabled(),
            age_boost_threshold_ms: default_age_boost_threshold_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// Rejects configurations that would stall or wedge the scheduler.
    pub fn validate(&self) -> ConductorResult<()> {
        if self.max_concurrent == 0 {
            return Err(ConductorError::Config(
                "max_concurrent must be positive".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConductorError::Config(
                "queue_capacity must be positive".to_string(),
            ));
        }
        if self.task_timeout_ms == 0 {
            return Err(ConductorError::Config(
                "task_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConductorError::Config(
                "max_retries must be positive".to_string(),
            ));
        }
        if self.age_boost_threshold_ms == 0 {
            return Err(ConductorError::Config(
                "age_boost_threshold_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.task_timeout_ms, 300_000);
        assert!(config.retry_failed);
        assert_eq!(config.max_retries, 3);
        assert!(config.age_boost_enabled);
        assert_eq!(config.age_boost_threshold_ms, 60_000);
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        for mutate in [
            (|c: &mut OrchestratorConfig| c.max_concurrent = 0) as fn(&mut OrchestratorConfig),
            |c| c.queue_capacity = 0,
            |c| c.task_timeout_ms = 0,
            |c| c.max_retries = 0,
            |c| c.age_boost_threshold_ms = 0,
        ] {
            let mut config = OrchestratorConfig::default();
            mutate(&mut config);
            assert!(matches!(
                config.validate(),
                Err(ConductorError::Config(_))
            ));
        }
    }

    #[test]
    fn test_deserialization_fills_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{ "max_concurrent": 2 }"#).unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.queue_capacity, 100);
    }
}
