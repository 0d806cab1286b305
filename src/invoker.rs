//! Tool invocation with bounded retry
//!
//! One logical invocation, including its backoff retries, produces exactly
//! one step record and is charged as a single step against both budgets.
//! Failure is encoded in the record instead of raised, so the loop can reason
//! about it.

use crate::error::AgentError;
use crate::models::{StepOutcome, StepRecord, ToolInvocation};
use crate::tools::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    retry_limit: u32,
    backoff_base: Duration,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>, retry_limit: u32) -> Self {
        Self {
            registry,
            retry_limit,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Override the backoff base interval (used by tests to avoid real sleeps).
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Execute one invocation synchronously, retrying transient failures with
    /// exponential backoff, and return the finished step record.
    pub async fn invoke(
        &self,
        task_id: Uuid,
        invocation: ToolInvocation,
        sequence: u64,
    ) -> StepRecord {
        let outcome = self.attempt_with_retries(&invocation).await;
        StepRecord {
            task_id,
            invocation,
            outcome,
            sequence,
        }
    }

    async fn attempt_with_retries(&self, invocation: &ToolInvocation) -> StepOutcome {
        let Some(tool) = self.registry.get(&invocation.tool_name) else {
            return StepOutcome::Failed {
                error: format!("tool '{}' is not registered", invocation.tool_name),
            };
        };

        let attempts = self.retry_limit + 1;
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match tool.execute(invocation).await {
                Ok(data) => {
                    debug!(tool = %invocation.tool_name, attempt, "Tool call succeeded");
                    return StepOutcome::Success { data };
                }
                // Bad parameters will not improve on retry.
                Err(AgentError::InvalidToolInput(msg)) => {
                    warn!(tool = %invocation.tool_name, error = %msg, "Invalid tool input");
                    return StepOutcome::Failed {
                        error: format!("invalid input: {}", msg),
                    };
                }
                Err(e) => {
                    warn!(
                        tool = %invocation.tool_name,
                        attempt,
                        error = %e,
                        "Tool call failed"
                    );
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < attempts {
                let backoff = self.backoff_base * 2u32.pow(attempt);
                tokio::time::sleep(backoff).await;
            }
        }

        StepOutcome::Failed {
            error: format!("failed after {} attempts: {}", attempts, last_error),
        }
    }
}
