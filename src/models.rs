//! Core data models for the trading agent

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Active,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanStatus {
    Completed,
    Partial,
}

//
// ================= Task & Plan =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            status: TaskStatus::Pending,
        }
    }
}

/// Ordered sequence of tasks. Insertion order is execution order; tasks are
/// never removed so the final report can account for every one of them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskPlan {
    tasks: Vec<Task>,
}

impl TaskPlan {
    /// Build a plan from tasks, rejecting empty decompositions and id
    /// collisions.
    pub fn new(tasks: Vec<Task>) -> crate::Result<Self> {
        if tasks.is_empty() {
            return Err(crate::error::AgentError::Planning(
                "task decomposition is empty".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::with_capacity(tasks.len());
        for task in &tasks {
            if !seen.insert(task.id) {
                return Err(crate::error::AgentError::Planning(format!(
                    "duplicate task id {}",
                    task.id
                )));
            }
        }
        Ok(Self { tasks })
    }

    pub fn empty() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, task_id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Next task still waiting to run, in insertion order.
    pub fn next_pending(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Pending)
    }

    pub fn activate(&mut self, task_id: Uuid) {
        self.set_status(task_id, TaskStatus::Active);
    }

    pub fn complete(&mut self, task_id: Uuid) {
        self.set_status(task_id, TaskStatus::Complete);
    }

    pub fn fail(&mut self, task_id: Uuid) {
        self.set_status(task_id, TaskStatus::Failed);
    }

    pub fn all_complete(&self) -> bool {
        !self.tasks.is_empty()
            && self.tasks.iter().all(|t| t.status == TaskStatus::Complete)
    }

    fn set_status(&mut self, task_id: Uuid, status: TaskStatus) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) {
            // Terminal statuses are written at most once.
            if !task.status.is_terminal() {
                task.status = status;
            }
        }
    }
}

//
// ================= Step History =================
//

/// One proposed tool call. Two invocations are equivalent iff tool name and
/// parameters are structurally equal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum StepOutcome {
    Success { data: Value },
    Failed { error: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }
}

/// Immutable log entry for one tool invocation attempt and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub task_id: Uuid,
    pub invocation: ToolInvocation,
    pub outcome: StepOutcome,
    pub sequence: u64,
}

/// Per-run mutable state: the evidentiary history plus the step counters the
/// budget guard reads. Owned and written exclusively by the orchestrator.
#[derive(Debug, Default)]
pub struct ExecutionState {
    history: Vec<StepRecord>,
    per_task_steps: HashMap<Uuid, u32>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and charge one step to its task. The invariant
    /// `global_step_count == history.len()` holds because this is the only
    /// writer.
    pub fn record(&mut self, record: StepRecord) {
        *self.per_task_steps.entry(record.task_id).or_insert(0) += 1;
        self.history.push(record);
    }

    pub fn global_step_count(&self) -> u32 {
        self.history.len() as u32
    }

    pub fn task_step_count(&self, task_id: Uuid) -> u32 {
        self.per_task_steps.get(&task_id).copied().unwrap_or(0)
    }

    pub fn next_sequence(&self) -> u64 {
        self.history.len() as u64
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn records_for(&self, task_id: Uuid) -> impl Iterator<Item = &StepRecord> {
        self.history.iter().filter(move |r| r.task_id == task_id)
    }
}

//
// ================= Recommendation =================
//

/// Structured long-position sizing guidance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionSizing {
    pub entry_zone: String,
    pub initial_allocation_pct: f64,
    pub max_allocation_pct: f64,
    pub stop_loss: String,
    pub scaling: String,
}

impl Default for PositionSizing {
    fn default() -> Self {
        Self {
            entry_zone: "no entry: insufficient evidence".to_string(),
            initial_allocation_pct: 0.0,
            max_allocation_pct: 0.0,
            stop_loss: "n/a".to_string(),
            scaling: "n/a".to_string(),
        }
    }
}

/// Final output of a run. Produced exactly once, even for aborted runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub thesis: String,
    pub position_sizing: PositionSizing,
    pub risk_notes: String,
    pub plan_status: PlanStatus,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Active => "ACTIVE",
            TaskStatus::Complete => "COMPLETE",
            TaskStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Completed => "COMPLETED",
            PlanStatus::Partial => "PARTIAL",
        };
        write!(f, "{}", s)
    }
}
