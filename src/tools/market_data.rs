//! Price history tool backed by the Yahoo chart endpoint

use crate::cache::{is_offline, FileCache};
use crate::error::AgentError;
use crate::models::ToolInvocation;
use crate::tools::{require_ticker, Tool, YahooClient};
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

const VALID_PERIODS: &[&str] = &["1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max"];
const VALID_INTERVALS: &[&str] = &["1d", "1wk", "1mo", "1h", "1m"];

pub struct PriceHistoryTool {
    yahoo: Arc<YahooClient>,
    cache: Arc<FileCache>,
}

impl PriceHistoryTool {
    pub fn new(yahoo: Arc<YahooClient>, cache: Arc<FileCache>) -> Self {
        Self { yahoo, cache }
    }
}

#[async_trait::async_trait]
impl Tool for PriceHistoryTool {
    fn name(&self) -> &'static str {
        "get_price_history"
    }

    fn description(&self) -> &'static str {
        "Download historical OHLCV bars for a ticker. Parameters: ticker (required), \
         period (1mo|3mo|6mo|1y|2y|5y|10y|ytd|max, default 1y), interval (1d|1wk|1mo|1h|1m, \
         default 1d), include_adj_close (bool, default true), end_date (optional YYYY-MM-DD \
         inclusive cutoff)"
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<Value> {
        let ticker = require_ticker(invocation, "ticker")?;
        let period = string_param(invocation, "period", "1y");
        let interval = string_param(invocation, "interval", "1d");
        let include_adj_close = invocation
            .parameters
            .get("include_adj_close")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let end_date = optional_end_date(invocation)?;

        if !VALID_PERIODS.contains(&period.as_str()) {
            return Err(AgentError::InvalidToolInput(format!(
                "unsupported period '{}'",
                period
            )));
        }
        if !VALID_INTERVALS.contains(&interval.as_str()) {
            return Err(AgentError::InvalidToolInput(format!(
                "unsupported interval '{}'",
                interval
            )));
        }

        let cache_key = format!(
            "{}_{}_{}_{}",
            ticker,
            period,
            interval,
            end_date.map(|d| d.to_string()).unwrap_or_else(|| "latest".to_string())
        );

        if is_offline() {
            return self
                .cache
                .load("price_history", &cache_key)
                .map(|mut payload| {
                    payload["source"] = json!("cache");
                    payload
                })
                .ok_or_else(|| {
                    AgentError::ToolExecution(
                        "price history unavailable in offline mode, no cached data for the \
                         requested parameters"
                            .to_string(),
                    )
                });
        }

        let chart = self.yahoo.chart(&ticker, &period, &interval).await?;
        let bars = extract_bars(&chart, include_adj_close, end_date);

        if bars.is_empty() {
            return Ok(json!({
                "resource": "price_history",
                "ticker": ticker,
                "period": period,
                "interval": interval,
                "bars": [],
                "message": "No price data returned for the requested parameters.",
            }));
        }

        debug!(ticker = %ticker, bars = bars.len(), "Price history downloaded");

        let latest = bars.last().cloned().unwrap_or_else(|| json!({}));
        let mut payload = json!({
            "resource": "price_history",
            "ticker": ticker,
            "period": period,
            "interval": interval,
            "bars": bars,
            "latest_close": latest.get("close").cloned().unwrap_or(Value::Null),
            "latest_date": latest.get("date").cloned().unwrap_or(Value::Null),
            "downloaded_at": Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        });
        if let Some(end) = end_date {
            payload["end_date"] = json!(end.to_string());
        }

        self.cache.save("price_history", &cache_key, &payload)?;
        payload["source"] = json!("live");
        Ok(payload)
    }
}

fn string_param(invocation: &ToolInvocation, field: &str, default: &str) -> String {
    invocation
        .parameters
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn optional_end_date(invocation: &ToolInvocation) -> Result<Option<NaiveDate>> {
    match invocation.parameters.get("end_date").and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                AgentError::InvalidToolInput(
                    "end_date must be a valid date string in YYYY-MM-DD format".to_string(),
                )
            }),
    }
}

/// Flatten the chart payload into a list of bar objects, dropping candles
/// with no close and anything past the optional cutoff date.
fn extract_bars(chart: &Value, include_adj_close: bool, end_date: Option<NaiveDate>) -> Vec<Value> {
    let timestamps: Vec<i64> = chart
        .get("timestamp")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    let quote = chart.pointer("/indicators/quote/0").cloned().unwrap_or(Value::Null);
    let adjclose = chart.pointer("/indicators/adjclose/0/adjclose").cloned();

    let series = |field: &str| -> Vec<Option<f64>> {
        quote
            .get(field)
            .and_then(Value::as_array)
            .map(|a| a.iter().map(Value::as_f64).collect())
            .unwrap_or_default()
    };

    let opens = series("open");
    let highs = series("high");
    let lows = series("low");
    let closes = series("close");
    let volumes = series("volume");
    let adjusted: Vec<Option<f64>> = adjclose
        .as_ref()
        .and_then(Value::as_array)
        .map(|a| a.iter().map(Value::as_f64).collect())
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(close) = closes.get(i).copied().flatten() else {
            continue;
        };
        let Some(datetime) = DateTime::<Utc>::from_timestamp(*ts, 0) else {
            continue;
        };
        if let Some(cutoff) = end_date {
            if datetime.date_naive() > cutoff {
                continue;
            }
        }

        let mut bar = json!({
            "date": datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            "open": opens.get(i).copied().flatten().unwrap_or(0.0),
            "high": highs.get(i).copied().flatten().unwrap_or(0.0),
            "low": lows.get(i).copied().flatten().unwrap_or(0.0),
            "close": close,
            "volume": volumes.get(i).copied().flatten().unwrap_or(0.0),
        });
        if include_adj_close {
            if let Some(adj) = adjusted.get(i).copied().flatten() {
                bar["adj_close"] = json!(adj);
            }
        }
        bars.push(bar);
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chart() -> Value {
        // Two trading days, second one past the cutoff used below.
        json!({
            "timestamp": [1704153600, 1735776000],
            "indicators": {
                "quote": [{
                    "open": [10.0, 20.0],
                    "high": [11.0, 21.0],
                    "low": [9.0, 19.0],
                    "close": [10.5, 20.5],
                    "volume": [1000.0, 2000.0],
                }],
                "adjclose": [{"adjclose": [10.4, 20.4]}],
            }
        })
    }

    #[test]
    fn test_extract_bars_with_adj_close() {
        let bars = extract_bars(&sample_chart(), true, None);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0]["close"], json!(10.5));
        assert_eq!(bars[0]["adj_close"], json!(10.4));
        assert!(bars[0]["date"].as_str().unwrap().starts_with("2024-01-"));
    }

    #[test]
    fn test_extract_bars_honours_end_date() {
        let cutoff = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let bars = extract_bars(&sample_chart(), false, Some(cutoff));
        assert_eq!(bars.len(), 1);
        assert!(bars[0].get("adj_close").is_none());
    }

    #[test]
    fn test_extract_bars_skips_null_closes() {
        let chart = json!({
            "timestamp": [1704153600, 1704240000],
            "indicators": {"quote": [{
                "open": [10.0, null],
                "high": [11.0, null],
                "low": [9.0, null],
                "close": [10.5, null],
                "volume": [1000.0, null],
            }]}
        });
        let bars = extract_bars(&chart, true, None);
        assert_eq!(bars.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_period_rejected() {
        let tool = PriceHistoryTool::new(
            Arc::new(YahooClient::new().unwrap()),
            Arc::new(FileCache::at(std::env::temp_dir())),
        );
        let invocation = ToolInvocation {
            tool_name: "get_price_history".to_string(),
            parameters: json!({"ticker": "NVDA", "period": "7y"}),
        };
        assert!(matches!(
            tool.execute(&invocation).await,
            Err(AgentError::InvalidToolInput(_))
        ));
    }

    #[test]
    fn test_optional_end_date_parses() {
        let invocation = ToolInvocation {
            tool_name: "get_price_history".to_string(),
            parameters: json!({"ticker": "NVDA", "end_date": "2024-08-30"}),
        };
        assert_eq!(
            optional_end_date(&invocation).unwrap(),
            Some(NaiveDate::from_ymd_opt(2024, 8, 30).unwrap())
        );

        let bad = ToolInvocation {
            tool_name: "get_price_history".to_string(),
            parameters: json!({"end_date": "August 30"}),
        };
        assert!(optional_end_date(&bad).is_err());
    }
}
