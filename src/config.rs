//! Runtime configuration for one orchestrator run
//!
//! All ceilings are hard limits: the orchestrator consults them before every
//! tool invocation and never exceeds them, whatever the model decides.

use std::env;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Global ceiling on tool invocations across the whole run.
    pub max_steps: u32,
    /// Ceiling on tool invocations charged to a single task.
    pub max_steps_per_task: u32,
    /// Sliding-window size for repeated-invocation detection.
    pub loop_window: usize,
    /// Retries of one logical tool call before its failure is recorded.
    pub tool_retry_limit: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 24,
            max_steps_per_task: 6,
            loop_window: 3,
            tool_retry_limit: 2,
        }
    }
}

impl AgentConfig {
    /// Build a config from the environment, falling back to the documented
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_steps: env_u32("AGENT_MAX_STEPS", defaults.max_steps),
            max_steps_per_task: env_u32(
                "AGENT_MAX_STEPS_PER_TASK",
                defaults.max_steps_per_task,
            ),
            loop_window: env_u32("AGENT_LOOP_WINDOW", defaults.loop_window as u32) as usize,
            tool_retry_limit: env_u32("AGENT_TOOL_RETRY_LIMIT", defaults.tool_retry_limit),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.loop_window, 3);
        assert_eq!(config.tool_retry_limit, 2);
        assert!(config.max_steps_per_task <= config.max_steps);
    }
}
