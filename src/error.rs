//! Error types for the trading agent orchestrator

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Core Loop Errors
    // =============================

    /// No usable plan could be produced. Fatal to the run.
    #[error("Planning error: {0}")]
    Planning(String),

    /// No registered tool can supply what the active task needs.
    /// Fatal to the task only.
    #[error("No applicable tool: {0}")]
    NoApplicableTool(String),

    /// A tool call failed after exhausting its retry budget. Recorded in the
    /// step history rather than aborting the run.
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// The same invocation was selected for a full detection window.
    #[error("Loop detected: {0}")]
    LoopDetected(String),

    /// A step-budget ceiling would be exceeded.
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The model returned output that does not conform to the requested
    /// schema, or no output at all.
    #[error("Model response error: {0}")]
    ModelResponse(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
