//! Hard step-budget enforcement
//!
//! Consulted before every tool invocation; if a ceiling would be exceeded,
//! the invocation is never attempted. A global breach aborts the run, a
//! per-task breach terminates only the active task.

use crate::error::AgentError;
use crate::models::ExecutionState;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetBreach {
    Global,
    PerTask,
}

pub struct StepBudgetGuard {
    max_steps: u32,
    max_steps_per_task: u32,
}

impl StepBudgetGuard {
    pub fn new(max_steps: u32, max_steps_per_task: u32) -> Self {
        Self {
            max_steps,
            max_steps_per_task,
        }
    }

    /// Check whether one more step for `task_id` fits inside both ceilings.
    pub fn check(&self, state: &ExecutionState, task_id: Uuid) -> Result<(), BudgetBreach> {
        if state.global_step_count() + 1 > self.max_steps {
            return Err(BudgetBreach::Global);
        }
        if state.task_step_count(task_id) + 1 > self.max_steps_per_task {
            return Err(BudgetBreach::PerTask);
        }
        Ok(())
    }
}

impl BudgetBreach {
    pub fn into_error(self, state: &ExecutionState) -> AgentError {
        match self {
            BudgetBreach::Global => AgentError::BudgetExceeded(format!(
                "global step budget exhausted after {} steps",
                state.global_step_count()
            )),
            BudgetBreach::PerTask => AgentError::BudgetExceeded(
                "per-task step budget exhausted for the active task".to_string(),
            ),
        }
    }
}
