//! Fundamentals snapshot tool backed by the Yahoo quoteSummary endpoint

use crate::cache::{is_offline, FileCache};
use crate::error::AgentError;
use crate::models::ToolInvocation;
use crate::tools::{require_ticker, Tool, YahooClient};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

const MODULES: &str = "price,summaryDetail,defaultKeyStatistics,financialData,assetProfile";

pub struct FinancialSnapshotTool {
    yahoo: Arc<YahooClient>,
    cache: Arc<FileCache>,
}

impl FinancialSnapshotTool {
    pub fn new(yahoo: Arc<YahooClient>, cache: Arc<FileCache>) -> Self {
        Self { yahoo, cache }
    }
}

#[async_trait::async_trait]
impl Tool for FinancialSnapshotTool {
    fn name(&self) -> &'static str {
        "get_financial_snapshot"
    }

    fn description(&self) -> &'static str {
        "Retrieve key fundamental data for a ticker: valuation ratios, growth and margin \
         figures, dividend yield, beta, 52-week range, sector and industry. \
         Parameters: ticker (required)"
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<Value> {
        let ticker = require_ticker(invocation, "ticker")?;

        if is_offline() {
            return self
                .cache
                .load("financial_snapshot", &ticker)
                .map(|mut payload| {
                    payload["source"] = json!("cache");
                    payload
                })
                .ok_or_else(|| {
                    AgentError::ToolExecution(
                        "financial snapshot unavailable in offline mode, no cached data for the \
                         requested ticker"
                            .to_string(),
                    )
                });
        }

        let summary = self.yahoo.quote_summary(&ticker, MODULES).await?;
        let mut payload = build_snapshot(&ticker, &summary);

        debug!(ticker = %ticker, "Financial snapshot downloaded");

        self.cache.save("financial_snapshot", &ticker, &payload)?;
        payload["source"] = json!("live");
        Ok(payload)
    }
}

/// Yahoo wraps most numbers as {"raw": ..., "fmt": "..."}; prefer the raw
/// value, fall back to a bare number.
fn raw_number(summary: &Value, pointer: &str) -> Value {
    let node = summary.pointer(pointer);
    node.and_then(|v| v.get("raw").cloned().or_else(|| v.as_f64().map(Value::from)))
        .unwrap_or(Value::Null)
}

fn raw_string(summary: &Value, pointer: &str) -> Value {
    summary
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(|s| json!(s))
        .unwrap_or(Value::Null)
}

fn build_snapshot(ticker: &str, summary: &Value) -> Value {
    json!({
        "resource": "financial_snapshot",
        "ticker": ticker,
        "company_name": raw_string(summary, "/price/longName"),
        "currency": raw_string(summary, "/price/currency"),
        "market_cap": raw_number(summary, "/price/marketCap"),
        "trailing_pe": raw_number(summary, "/summaryDetail/trailingPE"),
        "forward_pe": raw_number(summary, "/summaryDetail/forwardPE"),
        "peg_ratio": raw_number(summary, "/defaultKeyStatistics/pegRatio"),
        "price_to_sales": raw_number(summary, "/summaryDetail/priceToSalesTrailing12Months"),
        "price_to_book": raw_number(summary, "/defaultKeyStatistics/priceToBook"),
        "dividend_yield": raw_number(summary, "/summaryDetail/dividendYield"),
        "beta": raw_number(summary, "/summaryDetail/beta"),
        "52_week_high": raw_number(summary, "/summaryDetail/fiftyTwoWeekHigh"),
        "52_week_low": raw_number(summary, "/summaryDetail/fiftyTwoWeekLow"),
        "revenue_growth": raw_number(summary, "/financialData/revenueGrowth"),
        "profit_margins": raw_number(summary, "/financialData/profitMargins"),
        "free_cash_flow": raw_number(summary, "/financialData/freeCashflow"),
        "return_on_equity": raw_number(summary, "/financialData/returnOnEquity"),
        "sector": raw_string(summary, "/assetProfile/sector"),
        "industry": raw_string(summary, "/assetProfile/industry"),
    })
}
