//! Tool trait and registry
//!
//! Tools are deterministic data operations; the model decides *which* call
//! to make, never what the data says. The default set is backed by the free
//! Yahoo Finance endpoints, with an offline file cache for replayable runs.

use crate::cache::FileCache;
use crate::error::AgentError;
use crate::models::ToolInvocation;
use crate::Result;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

pub mod fundamentals;
pub mod market_data;
pub mod strategy;

pub use fundamentals::FinancialSnapshotTool;
pub use market_data::PriceHistoryTool;
pub use strategy::LongStrategyTool;

/// Trait for a single tool (deterministic execution).
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, invocation: &ToolInvocation) -> Result<Value>;
}

/// Tool registry for looking up and describing tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Name + description lines for the action-selection prompt, in
    /// registration order.
    pub fn describe(&self) -> String {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared client for the public Yahoo Finance endpoints.
pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; trading-agent/0.1)")
            .build()?;

        let base_url = env::var("YAHOO_BASE_URL")
            .unwrap_or_else(|_| "https://query1.finance.yahoo.com".to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("request failed for {}: {}", path, e)))?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("invalid JSON response: {}", e)))?;

        if !status.is_success() {
            return Err(AgentError::ToolExecution(format!(
                "Yahoo endpoint returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }

    /// OHLCV candles via the chart endpoint.
    pub async fn chart(&self, ticker: &str, range: &str, interval: &str) -> Result<Value> {
        let path = format!("/v8/finance/chart/{}", ticker);
        let body = self
            .get_json(&path, &[("range", range), ("interval", interval), ("events", "div,split")])
            .await?;

        let result = body
            .pointer("/chart/result/0")
            .cloned()
            .ok_or_else(|| {
                let detail = body
                    .pointer("/chart/error/description")
                    .and_then(Value::as_str)
                    .unwrap_or("no chart data in response");
                AgentError::ToolExecution(format!("chart request for {} failed: {}", ticker, detail))
            })?;

        Ok(result)
    }

    /// Fundamental data via the quoteSummary endpoint.
    pub async fn quote_summary(&self, ticker: &str, modules: &str) -> Result<Value> {
        let path = format!("/v10/finance/quoteSummary/{}", ticker);
        let body = self.get_json(&path, &[("modules", modules)]).await?;

        body.pointer("/quoteSummary/result/0").cloned().ok_or_else(|| {
            let detail = body
                .pointer("/quoteSummary/error/description")
                .and_then(Value::as_str)
                .unwrap_or("no fundamentals in response");
            AgentError::ToolExecution(format!(
                "quoteSummary request for {} failed: {}",
                ticker, detail
            ))
        })
    }
}

pub(crate) fn require_ticker(invocation: &ToolInvocation, field: &str) -> Result<String> {
    let ticker = invocation
        .parameters
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_default();

    if ticker.is_empty() {
        return Err(AgentError::InvalidToolInput(format!(
            "expected non-empty '{}' in tool parameters",
            field
        )));
    }
    Ok(ticker)
}

/// Create the default registry: price history, fundamentals snapshot, and
/// long-strategy evaluation, all sharing one Yahoo client and cache.
pub fn create_default_registry() -> Result<ToolRegistry> {
    let yahoo = Arc::new(YahooClient::new()?);
    let cache = Arc::new(FileCache::from_env());

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(PriceHistoryTool::new(yahoo.clone(), cache.clone())));
    registry.register(Arc::new(FinancialSnapshotTool::new(yahoo.clone(), cache.clone())));
    registry.register(Arc::new(LongStrategyTool::new(yahoo, cache)));
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &'static str {
            "Echo the parameters back"
        }
        async fn execute(&self, invocation: &ToolInvocation) -> Result<Value> {
            Ok(invocation.parameters.clone())
        }
    }

    #[test]
    fn test_registry_lookup_and_describe() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list(), vec!["echo"]);
        assert!(registry.describe().contains("Echo the parameters back"));
    }

    #[test]
    fn test_require_ticker_normalizes() {
        let invocation = ToolInvocation {
            tool_name: "echo".to_string(),
            parameters: json!({"ticker": " nvda "}),
        };
        assert_eq!(require_ticker(&invocation, "ticker").unwrap(), "NVDA");

        let empty = ToolInvocation {
            tool_name: "echo".to_string(),
            parameters: json!({}),
        };
        assert!(require_ticker(&empty, "ticker").is_err());
    }
}
