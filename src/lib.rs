//! Long-Only Trading Research Agent
//!
//! An autonomous agent that turns a natural-language trading question into a
//! risk-aware long-position recommendation:
//! - Decomposes the query into an ordered plan of evidence-gathering tasks
//! - Selects and invokes market-data / fundamentals / strategy tools
//! - Validates evidence sufficiency before closing each task
//! - Enforces hard step budgets and loop detection around a non-deterministic
//!   decision model
//! - Always terminates with a structured recommendation, even on partial runs
//!
//! UNIFIED LOOP:
//! QUERY → PLAN → (SELECT → INVOKE → VALIDATE)* → ANSWER

pub mod agent;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod invoker;
pub mod loop_detector;
pub mod model;
pub mod models;
pub mod planner;
pub mod prompts;
pub mod selector;
pub mod synthesizer;
pub mod tools;
pub mod validation;

pub use error::Result;

// Re-export common types
pub use config::AgentConfig;
pub use models::*;
