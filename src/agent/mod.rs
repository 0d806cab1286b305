//! Orchestrator: the run-level state machine
//!
//! PLANNING → EXECUTING → ANSWERING, with a bounded inner loop per task:
//! guard → select → loop-check → invoke → record → validate. One step is one
//! attempt to advance a task with one tool invocation; invoker-internal
//! retries collapse into the step they belong to.

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::guard::{BudgetBreach, StepBudgetGuard};
use crate::invoker::ToolInvoker;
use crate::loop_detector::LoopDetector;
use crate::model::Model;
use crate::models::{ExecutionState, Recommendation, StepOutcome, StepRecord, Task, TaskPlan};
use crate::planner::TaskPlanner;
use crate::selector::ActionSelector;
use crate::synthesizer::AnswerSynthesizer;
use crate::tools::ToolRegistry;
use crate::validation::{GateDecision, ValidationGate};
use std::sync::Arc;
use tracing::{info, warn};

/// Why the executing phase wound down.
enum RunEnd {
    /// Every task reached a terminal status on its own.
    Exhausted,
    /// A run-fatal condition forced an early transition to answering.
    Aborted(String),
}

pub struct Orchestrator {
    planner: TaskPlanner,
    selector: ActionSelector,
    invoker: ToolInvoker,
    gate: ValidationGate,
    synthesizer: AnswerSynthesizer,
    guard: StepBudgetGuard,
    registry: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn Model>, registry: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            planner: TaskPlanner::new(Arc::clone(&model)),
            selector: ActionSelector::new(Arc::clone(&model)),
            invoker: ToolInvoker::new(Arc::clone(&registry), config.tool_retry_limit),
            gate: ValidationGate::new(Arc::clone(&model)),
            synthesizer: AnswerSynthesizer::new(model),
            guard: StepBudgetGuard::new(config.max_steps, config.max_steps_per_task),
            registry,
            config,
        }
    }

    /// Run one query end to end. Infallible by construction: every exit path
    /// flows through the synthesizer, so the caller always gets a
    /// recommendation.
    pub async fn run(&self, query: &str) -> Recommendation {
        info!(query, "Run started");

        let mut plan = match self.planner.plan(query, &self.registry).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Planning failed, answering without evidence");
                let state = ExecutionState::new();
                return self
                    .synthesizer
                    .synthesize(query, &TaskPlan::empty(), &state, Some(&e.to_string()))
                    .await;
            }
        };
        info!(tasks = plan.len(), "Plan accepted");

        let mut state = ExecutionState::new();
        let end = self.execute_plan(&mut plan, &mut state).await;

        let abort_reason = match end {
            RunEnd::Exhausted => None,
            RunEnd::Aborted(reason) => Some(reason),
        };
        self.synthesizer
            .synthesize(query, &plan, &state, abort_reason.as_deref())
            .await
    }

    async fn execute_plan(&self, plan: &mut TaskPlan, state: &mut ExecutionState) -> RunEnd {
        // Loop state persists across tasks; windows are keyed per task.
        let mut detector = LoopDetector::new(self.config.loop_window);

        while let Some(task) = plan.next_pending() {
            let task = task.clone();
            plan.activate(task.id);
            info!(task_id = %task.id, description = %task.description, "Task started");

            match self.run_task(&task, state, &mut detector).await {
                TaskEnd::Complete => plan.complete(task.id),
                TaskEnd::Failed(reason) => {
                    warn!(task_id = %task.id, %reason, "Task failed");
                    plan.fail(task.id);
                }
                TaskEnd::AbortRun(reason) => {
                    plan.fail(task.id);
                    return RunEnd::Aborted(reason);
                }
            }
        }

        RunEnd::Exhausted
    }

    async fn run_task(
        &self,
        task: &Task,
        state: &mut ExecutionState,
        detector: &mut LoopDetector,
    ) -> TaskEnd {
        loop {
            // Budgets are checked before anything else is attempted.
            match self.guard.check(state, task.id) {
                Ok(()) => {}
                Err(BudgetBreach::Global) => {
                    let err = BudgetBreach::Global.into_error(state);
                    return TaskEnd::AbortRun(err.to_string());
                }
                Err(BudgetBreach::PerTask) => {
                    let err = BudgetBreach::PerTask.into_error(state);
                    return TaskEnd::Failed(err.to_string());
                }
            }

            let invocation = match self.selector.select(task, state, &self.registry).await {
                Ok(invocation) => invocation,
                Err(AgentError::NoApplicableTool(reason)) => {
                    return TaskEnd::Failed(format!("no applicable tool: {}", reason));
                }
                Err(e) => return TaskEnd::Failed(e.to_string()),
            };

            // Loop detection runs on the selection, before any invocation.
            if let Err(e) = detector.observe(task.id, &invocation) {
                return TaskEnd::Failed(e.to_string());
            }

            let record = self
                .invoker
                .invoke(task.id, invocation, state.next_sequence())
                .await;
            log_step(&record);
            state.record(record);

            match self.gate.review(task, state).await {
                GateDecision::TaskComplete => return TaskEnd::Complete,
                GateDecision::TaskFailed => {
                    return TaskEnd::Failed("validation gate judged the task unrecoverable".to_string());
                }
                GateDecision::Continue => {}
            }
        }
    }
}

enum TaskEnd {
    Complete,
    Failed(String),
    AbortRun(String),
}

fn log_step(record: &StepRecord) {
    match &record.outcome {
        StepOutcome::Success { .. } => info!(
            sequence = record.sequence,
            tool = %record.invocation.tool_name,
            "Step succeeded"
        ),
        StepOutcome::Failed { error } => warn!(
            sequence = record.sequence,
            tool = %record.invocation.tool_name,
            %error,
            "Step failed"
        ),
    }
}
