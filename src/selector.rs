//! Action selection: choosing the next tool invocation for a task

use crate::error::AgentError;
use crate::model::{decide_as, Model};
use crate::models::{ExecutionState, Task, ToolInvocation};
use crate::prompts::action_system_prompt;
use crate::tools::ToolRegistry;
use crate::Result;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ActionDecision {
    tool_name: Option<String>,
    #[serde(default)]
    parameters: Value,
}

pub struct ActionSelector {
    model: Arc<dyn Model>,
}

impl ActionSelector {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    /// Choose the next invocation for the active task.
    ///
    /// A proposal that repeats an invocation already answered by a non-error
    /// result is re-prompted once with an explicit notice; a second identical
    /// proposal, an unknown tool, or a null tool all fail the task with
    /// [`AgentError::NoApplicableTool`].
    pub async fn select(
        &self,
        task: &Task,
        state: &ExecutionState,
        registry: &ToolRegistry,
    ) -> Result<ToolInvocation> {
        if registry.is_empty() {
            return Err(AgentError::NoApplicableTool(
                "no tools registered".to_string(),
            ));
        }

        let base_prompt = self.build_prompt(task, state, registry, None);
        let invocation = self.propose(&base_prompt).await?;

        if !self.already_satisfied(&invocation, task, state) {
            return self.check_registered(invocation, registry);
        }

        warn!(
            task_id = %task.id,
            tool = %invocation.tool_name,
            "Proposal repeats a satisfied invocation, re-prompting"
        );
        let retry_prompt = self.build_prompt(task, state, registry, Some(&invocation));
        let retried = self.propose(&retry_prompt).await?;

        if self.already_satisfied(&retried, task, state) {
            return Err(AgentError::NoApplicableTool(format!(
                "model keeps repeating '{}' although its result is already recorded",
                retried.tool_name
            )));
        }
        self.check_registered(retried, registry)
    }

    async fn propose(&self, prompt: &str) -> Result<ToolInvocation> {
        let decision: ActionDecision =
            decide_as(self.model.as_ref(), &action_system_prompt(), prompt)
                .await
                .map_err(|e| {
                    AgentError::NoApplicableTool(format!("action decision failed: {}", e))
                })?;

        let Some(tool_name) = decision.tool_name.filter(|n| !n.trim().is_empty()) else {
            return Err(AgentError::NoApplicableTool(
                "model declined to pick a tool for this task".to_string(),
            ));
        };

        let parameters = if decision.parameters.is_object() {
            decision.parameters
        } else {
            Value::Object(Default::default())
        };

        debug!(tool = %tool_name, "Action selected");
        Ok(ToolInvocation {
            tool_name: tool_name.trim().to_string(),
            parameters,
        })
    }

    fn check_registered(
        &self,
        invocation: ToolInvocation,
        registry: &ToolRegistry,
    ) -> Result<ToolInvocation> {
        if !registry.contains(&invocation.tool_name) {
            return Err(AgentError::NoApplicableTool(format!(
                "'{}' is not a registered tool",
                invocation.tool_name
            )));
        }
        Ok(invocation)
    }

    /// True when an equivalent invocation already produced a non-error result
    /// for this task.
    fn already_satisfied(
        &self,
        invocation: &ToolInvocation,
        task: &Task,
        state: &ExecutionState,
    ) -> bool {
        state
            .records_for(task.id)
            .any(|record| record.invocation == *invocation && record.outcome.is_success())
    }

    fn build_prompt(
        &self,
        task: &Task,
        state: &ExecutionState,
        registry: &ToolRegistry,
        repeated: Option<&ToolInvocation>,
    ) -> String {
        let mut prompt = format!(
            "Available tools:\n{}\n\nCurrent task:\n{}\n",
            registry.describe(),
            task.description
        );

        let history: Vec<String> = state
            .records_for(task.id)
            .map(|record| {
                let outcome = match &record.outcome {
                    crate::models::StepOutcome::Success { data } => {
                        format!("ok: {}", truncate(&data.to_string(), 600))
                    }
                    crate::models::StepOutcome::Failed { error } => format!("error: {}", error),
                };
                format!(
                    "- {}({}) -> {}",
                    record.invocation.tool_name, record.invocation.parameters, outcome
                )
            })
            .collect();

        if !history.is_empty() {
            prompt.push_str("\nEarlier tool calls for this task:\n");
            prompt.push_str(&history.join("\n"));
            prompt.push('\n');
        }

        if let Some(invocation) = repeated {
            prompt.push_str(&format!(
                "\nNOTE: {}({}) already succeeded for this task. Choose a different tool or \
                 different parameters, or return a null tool_name if nothing else is needed.\n",
                invocation.tool_name, invocation.parameters
            ));
        }

        prompt
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;
    use crate::models::{StepOutcome, StepRecord};
    use serde_json::json;

    fn registry_with_stub() -> ToolRegistry {
        struct NullTool;
        #[async_trait::async_trait]
        impl crate::tools::Tool for NullTool {
            fn name(&self) -> &'static str {
                "get_price_history"
            }
            fn description(&self) -> &'static str {
                "stub"
            }
            async fn execute(&self, _invocation: &ToolInvocation) -> Result<Value> {
                Ok(json!({}))
            }
        }
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NullTool));
        registry
    }

    #[tokio::test]
    async fn test_select_returns_invocation() {
        let model = Arc::new(ScriptedModel::constant(json!({
            "tool_name": "get_price_history",
            "parameters": {"ticker": "NVDA", "period": "2y"}
        })));
        let selector = ActionSelector::new(model);
        let task = Task::new("Download 2 years of daily prices for NVDA");
        let state = ExecutionState::new();

        let invocation = selector
            .select(&task, &state, &registry_with_stub())
            .await
            .unwrap();
        assert_eq!(invocation.tool_name, "get_price_history");
        assert_eq!(invocation.parameters["ticker"], json!("NVDA"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_rejected() {
        let model = Arc::new(ScriptedModel::constant(json!({
            "tool_name": "teleport",
            "parameters": {}
        })));
        let selector = ActionSelector::new(model);
        let task = Task::new("Download prices");
        let state = ExecutionState::new();

        let result = selector.select(&task, &state, &registry_with_stub()).await;
        assert!(matches!(result, Err(AgentError::NoApplicableTool(_))));
    }

    #[tokio::test]
    async fn test_null_tool_means_no_applicable_tool() {
        let model = Arc::new(ScriptedModel::constant(json!({
            "tool_name": null,
            "parameters": {}
        })));
        let selector = ActionSelector::new(model);
        let task = Task::new("Explain what a moving average is");
        let state = ExecutionState::new();

        let result = selector.select(&task, &state, &registry_with_stub()).await;
        assert!(matches!(result, Err(AgentError::NoApplicableTool(_))));
    }

    #[tokio::test]
    async fn test_satisfied_repeat_is_reprompted_then_rejected() {
        // Model insists on the exact invocation that already succeeded.
        let model = Arc::new(ScriptedModel::constant(json!({
            "tool_name": "get_price_history",
            "parameters": {"ticker": "NVDA"}
        })));
        let selector = ActionSelector::new(model);
        let task = Task::new("Download prices for NVDA");

        let mut state = ExecutionState::new();
        state.record(StepRecord {
            task_id: task.id,
            invocation: ToolInvocation {
                tool_name: "get_price_history".to_string(),
                parameters: json!({"ticker": "NVDA"}),
            },
            outcome: StepOutcome::Success { data: json!({"bars": [1]}) },
            sequence: 0,
        });

        let result = selector.select(&task, &state, &registry_with_stub()).await;
        assert!(matches!(result, Err(AgentError::NoApplicableTool(_))));
    }

    #[tokio::test]
    async fn test_failed_attempt_may_be_repeated() {
        // A prior *error* outcome does not block an identical retry.
        let model = Arc::new(ScriptedModel::constant(json!({
            "tool_name": "get_price_history",
            "parameters": {"ticker": "NVDA"}
        })));
        let selector = ActionSelector::new(model);
        let task = Task::new("Download prices for NVDA");

        let mut state = ExecutionState::new();
        state.record(StepRecord {
            task_id: task.id,
            invocation: ToolInvocation {
                tool_name: "get_price_history".to_string(),
                parameters: json!({"ticker": "NVDA"}),
            },
            outcome: StepOutcome::Failed { error: "timeout".to_string() },
            sequence: 0,
        });

        let invocation = selector
            .select(&task, &state, &registry_with_stub())
            .await
            .unwrap();
        assert_eq!(invocation.tool_name, "get_price_history");
    }
}
