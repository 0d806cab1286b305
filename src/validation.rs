//! Evidence-sufficiency gate for the active task
//!
//! The gate closes a task when its recorded outputs jointly satisfy the
//! task's evidentiary requirement. The decision is model-scored but
//! deterministic given a fixed model and a fixed step history: the prompt is
//! a pure function of the records, and the unrecoverable-failure rule is
//! evaluated locally before the model is consulted.

use crate::error::AgentError;
use crate::model::{decide_as, Model};
use crate::models::{ExecutionState, StepOutcome, Task};
use crate::prompts::VALIDATION_SYSTEM_PROMPT;
use crate::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Continue,
    TaskComplete,
    TaskFailed,
}

#[derive(Debug, Deserialize)]
struct SufficiencyDecision {
    done: bool,
    #[serde(default)]
    reason: String,
}

pub struct ValidationGate {
    model: Arc<dyn Model>,
}

impl ValidationGate {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    /// Review the task against every step recorded for it.
    pub async fn review(&self, task: &Task, state: &ExecutionState) -> GateDecision {
        let records: Vec<_> = state.records_for(task.id).collect();
        let Some(latest) = records.last() else {
            return GateDecision::Continue;
        };

        let any_success = records.iter().any(|r| r.outcome.is_success());

        // A trailing unrecoverable failure with nothing useful before it
        // cannot be argued into completeness.
        if !latest.outcome.is_success() && !any_success {
            debug!(task_id = %task.id, "Latest attempt failed with no earlier evidence");
            return GateDecision::TaskFailed;
        }

        let prompt = build_prompt(task, &records);
        let decision: Result<SufficiencyDecision> =
            decide_as(self.model.as_ref(), VALIDATION_SYSTEM_PROMPT, &prompt).await;

        match decision {
            Ok(SufficiencyDecision { done: true, reason }) => {
                debug!(task_id = %task.id, reason = %reason, "Task evidence sufficient");
                GateDecision::TaskComplete
            }
            Ok(SufficiencyDecision { done: false, .. }) => GateDecision::Continue,
            Err(AgentError::ModelResponse(msg)) => {
                // Non-fatal here: let the budgets bound another attempt.
                warn!(task_id = %task.id, error = %msg, "Validation decision failed");
                GateDecision::Continue
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Validation decision failed");
                GateDecision::Continue
            }
        }
    }
}

fn build_prompt(task: &Task, records: &[&crate::models::StepRecord]) -> String {
    let mut prompt = format!("Task:\n{}\n\nRecorded tool outputs:\n", task.description);
    for record in records {
        let outcome = match &record.outcome {
            StepOutcome::Success { data } => format!("ok: {}", data),
            StepOutcome::Failed { error } => format!("error: {}", error),
        };
        prompt.push_str(&format!(
            "- step {}: {}({}) -> {}\n",
            record.sequence, record.invocation.tool_name, record.invocation.parameters, outcome
        ));
    }
    prompt
}
