//! Final answer composition
//!
//! The synthesizer never fails: whatever the run collected, including
//! nothing, it turns the evidence into a recommendation. Aborted or
//! partially-failed runs are reported as PARTIAL with explicit notes about
//! the evidence that is missing.

use crate::model::{decide_as, Model};
use crate::models::{
    ExecutionState, PlanStatus, PositionSizing, Recommendation, StepOutcome, TaskPlan, TaskStatus,
};
use crate::prompts::answer_system_prompt;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

const MAX_EVIDENCE_CHARS: usize = 1200;

#[derive(Debug, Deserialize)]
struct AnswerDraft {
    thesis: String,
    position_sizing: PositionSizing,
    #[serde(default)]
    risk_notes: String,
}

pub struct AnswerSynthesizer {
    model: Arc<dyn Model>,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    /// Compose the final recommendation from the plan and the full history.
    pub async fn synthesize(
        &self,
        query: &str,
        plan: &TaskPlan,
        state: &ExecutionState,
        abort_reason: Option<&str>,
    ) -> Recommendation {
        let plan_status = if abort_reason.is_none() && plan.all_complete() {
            PlanStatus::Completed
        } else {
            PlanStatus::Partial
        };

        let missing = missing_evidence_notes(plan, abort_reason);
        let evidence = evidence_digest(state);

        let draft = if evidence.is_empty() {
            None
        } else {
            self.draft_answer(query, plan, &evidence, &missing).await
        };

        let recommendation = match draft {
            Some(draft) => Recommendation {
                thesis: draft.thesis,
                position_sizing: draft.position_sizing,
                risk_notes: join_notes(draft.risk_notes, &missing),
                plan_status,
            },
            None => fallback_recommendation(query, state, &missing, plan_status),
        };

        info!(
            plan_status = %recommendation.plan_status,
            steps = state.global_step_count(),
            "Recommendation composed"
        );
        recommendation
    }

    async fn draft_answer(
        &self,
        query: &str,
        plan: &TaskPlan,
        evidence: &str,
        missing: &[String],
    ) -> Option<AnswerDraft> {
        let task_summary: Vec<String> = plan
            .tasks()
            .iter()
            .map(|t| format!("- [{}] {}", t.status, t.description))
            .collect();

        let mut prompt = format!(
            "User request:\n{}\n\nTask outcomes:\n{}\n\nCollected evidence:\n{}\n",
            query,
            task_summary.join("\n"),
            evidence
        );
        if !missing.is_empty() {
            prompt.push_str("\nEvidence gaps to acknowledge in the risk notes:\n");
            for note in missing {
                prompt.push_str(&format!("- {}\n", note));
            }
        }

        match decide_as::<AnswerDraft>(self.model.as_ref(), &answer_system_prompt(), &prompt).await
        {
            Ok(draft) if !draft.thesis.trim().is_empty() => Some(draft),
            Ok(_) => {
                warn!("Answer draft had an empty thesis, using fallback");
                None
            }
            Err(e) => {
                // Still non-fatal: the run must end with a recommendation.
                warn!(error = %e, "Answer drafting failed, using fallback");
                None
            }
        }
    }
}

/// Successful tool outputs, newest last, truncated for the prompt.
fn evidence_digest(state: &ExecutionState) -> String {
    let mut digest = String::new();
    for record in state.history() {
        if let StepOutcome::Success { data } = &record.outcome {
            let mut rendered = data.to_string();
            if rendered.len() > MAX_EVIDENCE_CHARS {
                let mut cut = MAX_EVIDENCE_CHARS;
                while !rendered.is_char_boundary(cut) {
                    cut -= 1;
                }
                rendered.truncate(cut);
                rendered.push('…');
            }
            digest.push_str(&format!(
                "- step {} {}: {}\n",
                record.sequence, record.invocation.tool_name, rendered
            ));
        }
    }
    digest
}

fn missing_evidence_notes(plan: &TaskPlan, abort_reason: Option<&str>) -> Vec<String> {
    let mut notes = Vec::new();
    if let Some(reason) = abort_reason {
        notes.push(format!("run terminated early: {}", reason));
    }
    if plan.is_empty() {
        notes.push("no task plan could be produced for this request".to_string());
    }
    for task in plan.tasks() {
        match task.status {
            TaskStatus::Failed => {
                notes.push(format!("evidence unavailable: {}", task.description))
            }
            TaskStatus::Pending | TaskStatus::Active => {
                notes.push(format!("not attempted or unfinished: {}", task.description))
            }
            TaskStatus::Complete => {}
        }
    }
    notes
}

fn join_notes(model_notes: String, missing: &[String]) -> String {
    let mut notes = model_notes.trim().to_string();
    for item in missing {
        let line = format!("Missing evidence: {}.", item);
        if !notes.contains(item) {
            if !notes.is_empty() {
                notes.push(' ');
            }
            notes.push_str(&line);
        }
    }
    if notes.is_empty() {
        notes.push_str("No outstanding risk caveats recorded.");
    }
    notes
}

/// Deterministic degraded answer when the model is unavailable or nothing
/// was collected.
fn fallback_recommendation(
    query: &str,
    state: &ExecutionState,
    missing: &[String],
    plan_status: PlanStatus,
) -> Recommendation {
    let successes = state
        .history()
        .iter()
        .filter(|r| r.outcome.is_success())
        .count();

    let thesis = if successes == 0 {
        format!(
            "No long recommendation for \"{}\": the run collected no usable market evidence, \
             so no position should be initiated.",
            query.trim()
        )
    } else {
        format!(
            "Evidence for \"{}\" is incomplete ({} successful tool result(s) collected); \
             defer any new long position until the remaining data can be gathered.",
            query.trim(),
            successes
        )
    };

    Recommendation {
        thesis,
        position_sizing: PositionSizing::default(),
        risk_notes: join_notes(String::new(), missing),
        plan_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;
    use crate::models::{StepRecord, Task, ToolInvocation};
    use serde_json::json;

    fn successful_step(task: &Task, sequence: u64) -> StepRecord {
        StepRecord {
            task_id: task.id,
            invocation: ToolInvocation {
                tool_name: "get_price_history".to_string(),
                parameters: json!({"ticker": "NVDA"}),
            },
            outcome: StepOutcome::Success { data: json!({"latest_close": 181.4}) },
            sequence,
        }
    }

    fn draft_response() -> serde_json::Value {
        json!({
            "thesis": "Initiate a long position in NVDA.",
            "position_sizing": {
                "entry_zone": "175-182",
                "initial_allocation_pct": 3.0,
                "max_allocation_pct": 6.0,
                "stop_loss": "8% below entry",
                "scaling": "add on pullbacks to the 63-day average"
            },
            "risk_notes": "Elevated valuation; size accordingly."
        })
    }

    #[tokio::test]
    async fn test_completed_plan_yields_completed_status() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(ScriptedModel::constant(draft_response())));
        let task = Task::new("Download prices for NVDA");
        let mut plan = TaskPlan::new(vec![task.clone()]).unwrap();
        plan.activate(task.id);
        plan.complete(task.id);

        let mut state = ExecutionState::new();
        state.record(successful_step(&task, 0));

        let rec = synthesizer
            .synthesize("Build a long plan for NVDA", &plan, &state, None)
            .await;

        assert_eq!(rec.plan_status, PlanStatus::Completed);
        assert!(!rec.position_sizing.entry_zone.is_empty());
        assert!(rec.thesis.contains("NVDA"));
    }

    #[tokio::test]
    async fn test_aborted_run_is_partial_and_names_missing_evidence() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(ScriptedModel::constant(draft_response())));
        let done = Task::new("Download prices for NVDA");
        let skipped = Task::new("Fetch fundamentals for NVDA");
        let mut plan = TaskPlan::new(vec![done.clone(), skipped.clone()]).unwrap();
        plan.activate(done.id);
        plan.complete(done.id);

        let mut state = ExecutionState::new();
        state.record(successful_step(&done, 0));

        let rec = synthesizer
            .synthesize(
                "Build a long plan for NVDA",
                &plan,
                &state,
                Some("global step budget exhausted after 1 steps"),
            )
            .await;

        assert_eq!(rec.plan_status, PlanStatus::Partial);
        assert!(rec.risk_notes.contains("terminated early"));
        assert!(rec.risk_notes.contains("Fetch fundamentals for NVDA"));
    }

    #[tokio::test]
    async fn test_empty_plan_still_produces_recommendation() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(ScriptedModel::constant(draft_response())));
        let state = ExecutionState::new();

        let rec = synthesizer
            .synthesize("Plan my wedding", &TaskPlan::empty(), &state, Some("no usable plan"))
            .await;

        assert_eq!(rec.plan_status, PlanStatus::Partial);
        assert!(rec.thesis.contains("no usable market evidence"));
        assert_eq!(rec.position_sizing, PositionSizing::default());
    }

    #[tokio::test]
    async fn test_model_failure_degrades_to_fallback() {
        let synthesizer =
            AnswerSynthesizer::new(Arc::new(ScriptedModel::constant(json!("nonsense"))));
        let task = Task::new("Download prices for NVDA");
        let mut plan = TaskPlan::new(vec![task.clone()]).unwrap();
        plan.activate(task.id);
        plan.complete(task.id);

        let mut state = ExecutionState::new();
        state.record(successful_step(&task, 0));

        let rec = synthesizer
            .synthesize("Build a long plan for NVDA", &plan, &state, None)
            .await;

        // Degraded but present: the run always ends with a recommendation.
        assert!(rec.thesis.contains("incomplete"));
        assert_eq!(rec.plan_status, PlanStatus::Completed);
    }
}
