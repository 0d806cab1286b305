//! Task planning: query decomposition via the model
//!
//! The planner turns the user's trading question into an ordered, non-empty
//! plan of atomic evidence-gathering tasks. It is pure given the query and
//! the model: no side effects, no access to execution state.

use crate::error::AgentError;
use crate::model::{decide_as, Model};
use crate::models::{Task, TaskPlan};
use crate::prompts::PLANNING_SYSTEM_PROMPT;
use crate::tools::ToolRegistry;
use crate::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct PlannedTasks {
    tasks: Vec<String>,
}

pub struct TaskPlanner {
    model: Arc<dyn Model>,
}

impl TaskPlanner {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    /// Decompose a query into an ordered task plan.
    ///
    /// Fails with [`AgentError::Planning`] when the model returns an empty
    /// decomposition or a malformed response twice in a row.
    pub async fn plan(&self, query: &str, registry: &ToolRegistry) -> Result<TaskPlan> {
        let prompt = format!(
            "Available tools:\n{}\n\nUser request:\n{}",
            registry.describe(),
            query
        );

        let decomposition: PlannedTasks =
            decide_as(self.model.as_ref(), PLANNING_SYSTEM_PROMPT, &prompt)
                .await
                .map_err(|e| AgentError::Planning(format!("decomposition failed: {}", e)))?;

        debug!(task_count = decomposition.tasks.len(), "Planner returned tasks");

        let tasks: Vec<Task> = decomposition
            .tasks
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .map(Task::new)
            .collect();

        let plan = TaskPlan::new(tasks)?;
        info!(task_count = plan.len(), "Plan created");
        Ok(plan)
    }
}
