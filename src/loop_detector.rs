//! Repetition guard over recent invocations
//!
//! The action selector is model-driven and may oscillate between a small set
//! of unproductive calls. The detector keeps a per-task sliding window of
//! selected invocations and flags once a full window is pairwise equivalent,
//! before the repeated invocation runs again.

use crate::error::AgentError;
use crate::models::ToolInvocation;
use crate::Result;
use std::collections::{HashMap, VecDeque};
use tracing::warn;
use uuid::Uuid;

pub struct LoopDetector {
    window: usize,
    recent: HashMap<Uuid, VecDeque<ToolInvocation>>,
}

impl LoopDetector {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            recent: HashMap::new(),
        }
    }

    /// Record a selected invocation and flag when it fills the window with
    /// equivalent entries. The caller must check this before invoking.
    pub fn observe(&mut self, task_id: Uuid, invocation: &ToolInvocation) -> Result<()> {
        let window = self.window;
        let recent = self.recent.entry(task_id).or_default();

        recent.push_back(invocation.clone());
        if recent.len() > window {
            recent.pop_front();
        }

        if recent.len() == window && recent.iter().all(|inv| inv == invocation) {
            warn!(
                task_id = %task_id,
                tool = %invocation.tool_name,
                window,
                "Identical invocation selected for a full window"
            );
            return Err(AgentError::LoopDetected(format!(
                "'{}' selected {} times in a row with identical parameters",
                invocation.tool_name, window
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invocation(ticker: &str) -> ToolInvocation {
        ToolInvocation {
            tool_name: "get_price_history".to_string(),
            parameters: json!({"ticker": ticker}),
        }
    }

    #[test]
    fn test_flags_on_full_window_of_repeats() {
        let mut detector = LoopDetector::new(3);
        let task = Uuid::new_v4();

        assert!(detector.observe(task, &invocation("NVDA")).is_ok());
        assert!(detector.observe(task, &invocation("NVDA")).is_ok());
        let third = detector.observe(task, &invocation("NVDA"));
        assert!(matches!(third, Err(AgentError::LoopDetected(_))));
    }

    #[test]
    fn test_parameter_change_resets_progress() {
        let mut detector = LoopDetector::new(3);
        let task = Uuid::new_v4();

        detector.observe(task, &invocation("NVDA")).unwrap();
        detector.observe(task, &invocation("NVDA")).unwrap();
        // Different parameters break the run of repeats.
        detector.observe(task, &invocation("SPY")).unwrap();
        detector.observe(task, &invocation("NVDA")).unwrap();
        assert!(detector.observe(task, &invocation("NVDA")).is_ok());
    }

    #[test]
    fn test_windows_are_per_task() {
        let mut detector = LoopDetector::new(2);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        detector.observe(first, &invocation("NVDA")).unwrap();
        // Same invocation under another task does not trip the first window.
        detector.observe(second, &invocation("NVDA")).unwrap();
        assert!(matches!(
            detector.observe(first, &invocation("NVDA")),
            Err(AgentError::LoopDetected(_))
        ));
    }
}
