//! Long-only moving-average crossover evaluation
//!
//! Quantifies trend, risk, and benchmark-relative performance for a single
//! ticker so the agent can ground its long recommendation in numbers.

use crate::cache::{is_offline, FileCache};
use crate::error::AgentError;
use crate::models::ToolInvocation;
use crate::tools::{require_ticker, Tool, YahooClient};
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

const TRADING_DAYS: f64 = 252.0;

pub struct LongStrategyTool {
    yahoo: Arc<YahooClient>,
    cache: Arc<FileCache>,
}

impl LongStrategyTool {
    pub fn new(yahoo: Arc<YahooClient>, cache: Arc<FileCache>) -> Self {
        Self { yahoo, cache }
    }

    /// Daily close series (adjusted when available), oldest first.
    async fn download_series(
        &self,
        symbol: &str,
        lookback_years: u32,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<(NaiveDate, f64)>> {
        let period = if lookback_years < 10 {
            format!("{}y", lookback_years)
        } else {
            "max".to_string()
        };
        let cache_key = format!(
            "{}_{}_{}",
            symbol,
            period,
            end_date.map(|d| d.to_string()).unwrap_or_else(|| "latest".to_string())
        );

        if is_offline() {
            let payload = self.cache.load("strategy_history", &cache_key).ok_or_else(|| {
                AgentError::ToolExecution(format!(
                    "strategy history unavailable in offline mode, no cached data for {} ({})",
                    symbol, period
                ))
            })?;
            return series_from_cache(&payload, symbol);
        }

        let chart = self.yahoo.chart(symbol, &period, "1d").await?;
        let series = close_series(&chart, end_date);
        if series.is_empty() {
            return Err(AgentError::ToolExecution(format!(
                "no historical prices returned for {}",
                symbol
            )));
        }

        let payload = json!({
            "symbol": symbol,
            "period": period,
            "end_date": end_date.map(|d| d.to_string()),
            "series": series
                .iter()
                .map(|(date, price)| json!({"date": date.to_string(), "price": price}))
                .collect::<Vec<_>>(),
        });
        self.cache.save("strategy_history", &cache_key, &payload)?;

        Ok(series)
    }
}

#[async_trait::async_trait]
impl Tool for LongStrategyTool {
    fn name(&self) -> &'static str {
        "evaluate_long_strategy"
    }

    fn description(&self) -> &'static str {
        "Evaluate a long-only moving-average crossover strategy for a ticker against a benchmark. \
         Returns CAGR, sharpe, sortino, max drawdown, hit rate, exposure, buy-and-hold and \
         benchmark comparison, plus a current-signal risk snapshot. Parameters: ticker (required), \
         benchmark (default SPY), lookback_years (1-10, default 3), short_window (5-120, default \
         21), long_window (20-252, default 63, must exceed short_window), risk_free_rate (0-0.1, \
         default 0.02), end_date (optional YYYY-MM-DD cutoff)"
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<Value> {
        let params = StrategyParams::parse(invocation)?;

        let ticker_series = self
            .download_series(&params.ticker, params.lookback_years, params.end_date)
            .await?;
        let benchmark_series = self
            .download_series(&params.benchmark, params.lookback_years, params.end_date)
            .await?;

        let (prices, benchmark_prices, dates) = align_series(&ticker_series, &benchmark_series);
        if dates.is_empty() {
            return Err(AgentError::ToolExecution(
                "not enough overlapping history between ticker and benchmark".to_string(),
            ));
        }

        let frame = compute_strategy(&prices, params.short_window, params.long_window);
        if frame.is_empty() {
            return Err(AgentError::ToolExecution(format!(
                "history too short for a {}-day moving average",
                params.long_window
            )));
        }

        let strategy_metrics = summarize(&frame.strategy_returns, &frame.positions, params.risk_free_rate);
        let buy_and_hold_metrics = summarize(&frame.returns, &vec![1.0; frame.len()], params.risk_free_rate);

        let benchmark_returns = returns_slice(&benchmark_prices, frame.start);
        let benchmark_metrics = summarize(&benchmark_returns, &vec![1.0; benchmark_returns.len()], params.risk_free_rate);

        debug!(
            ticker = %params.ticker,
            benchmark = %params.benchmark,
            observations = frame.len(),
            "Strategy evaluation complete"
        );

        let last = frame.len() - 1;
        let signal_state = if frame.positions[last] > 0.0 { "long" } else { "flat" };
        let distance_from_long_ma = frame.prices[last] / frame.ma_long[last] - 1.0;

        let recommendation = if signal_state == "long" {
            if distance_from_long_ma < 0.05 && strategy_metrics.sharpe > 1.0 {
                "scale_up"
            } else {
                "hold"
            }
        } else if last > 0
            && frame.ma_short[last - 1] <= frame.ma_long[last - 1]
            && frame.ma_short[last] > frame.ma_long[last]
        {
            "prepare_entry"
        } else {
            "monitor"
        };

        Ok(json!({
            "resource": "long_strategy_analysis",
            "ticker": params.ticker,
            "benchmark": params.benchmark,
            "lookback_years": params.lookback_years,
            "parameters": {
                "short_window": params.short_window,
                "long_window": params.long_window,
                "risk_free_rate": params.risk_free_rate,
            },
            "end_date": params.end_date.map(|d| d.to_string()),
            "strategy_metrics": strategy_metrics.to_json(),
            "buy_and_hold_metrics": buy_and_hold_metrics.to_json(),
            "benchmark_metrics": benchmark_metrics.to_json(),
            "risk_snapshot": {
                "current_signal": signal_state,
                "last_price": round4(frame.prices[last]),
                "ma_short": round4(frame.ma_short[last]),
                "ma_long": round4(frame.ma_long[last]),
                "distance_from_long_ma_pct": round4(distance_from_long_ma),
                "annualized_volatility": round4(annualized_vol(&frame.returns)),
                "max_drawdown": round4(strategy_metrics.max_drawdown),
            },
            "latest_signal_date": dates[frame.start + last].to_string(),
            "recommendation": recommendation,
        }))
    }
}

//
// ================= Parameters =================
//

struct StrategyParams {
    ticker: String,
    benchmark: String,
    lookback_years: u32,
    short_window: usize,
    long_window: usize,
    risk_free_rate: f64,
    end_date: Option<NaiveDate>,
}

impl StrategyParams {
    fn parse(invocation: &ToolInvocation) -> Result<Self> {
        let ticker = require_ticker(invocation, "ticker")?;
        let benchmark = invocation
            .parameters
            .get("benchmark")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "SPY".to_string());

        let lookback_years = u64_param(invocation, "lookback_years", 3);
        let short_window = u64_param(invocation, "short_window", 21) as usize;
        let long_window = u64_param(invocation, "long_window", 63) as usize;
        let risk_free_rate = invocation
            .parameters
            .get("risk_free_rate")
            .and_then(Value::as_f64)
            .unwrap_or(0.02);

        if !(1..=10).contains(&lookback_years) {
            return Err(AgentError::InvalidToolInput(
                "lookback_years must be between 1 and 10".to_string(),
            ));
        }
        if !(5..=120).contains(&short_window) {
            return Err(AgentError::InvalidToolInput(
                "short_window must be between 5 and 120 trading days".to_string(),
            ));
        }
        if !(20..=252).contains(&long_window) || short_window >= long_window {
            return Err(AgentError::InvalidToolInput(
                "long_window must be between 20 and 252 and greater than short_window".to_string(),
            ));
        }
        if !(0.0..=0.1).contains(&risk_free_rate) {
            return Err(AgentError::InvalidToolInput(
                "risk_free_rate must be between 0.0 and 0.1".to_string(),
            ));
        }

        let end_date = match invocation.parameters.get("end_date").and_then(Value::as_str) {
            None => None,
            Some(raw) => Some(NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                AgentError::InvalidToolInput(
                    "end_date must be a valid date string in YYYY-MM-DD format".to_string(),
                )
            })?),
        };

        Ok(Self {
            ticker,
            benchmark,
            lookback_years: lookback_years as u32,
            short_window,
            long_window,
            risk_free_rate,
            end_date,
        })
    }
}

fn u64_param(invocation: &ToolInvocation, field: &str, default: u64) -> u64 {
    invocation
        .parameters
        .get(field)
        .and_then(Value::as_u64)
        .unwrap_or(default)
}

//
// ================= Series Handling =================
//

fn series_from_cache(payload: &Value, symbol: &str) -> Result<Vec<(NaiveDate, f64)>> {
    let entries = payload
        .get("series")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| {
            AgentError::ToolExecution(format!("no cached time series found for {}", symbol))
        })?;

    let mut series: Vec<(NaiveDate, f64)> = entries
        .iter()
        .filter_map(|entry| {
            let date = entry.get("date")?.as_str()?;
            let price = entry.get("price")?.as_f64()?;
            NaiveDate::parse_from_str(date, "%Y-%m-%d").ok().map(|d| (d, price))
        })
        .collect();
    series.sort_by_key(|(date, _)| *date);
    Ok(series)
}

/// Pull a (date, close) series from a chart payload, preferring the adjusted
/// close column the way the strategy math expects.
fn close_series(chart: &Value, end_date: Option<NaiveDate>) -> Vec<(NaiveDate, f64)> {
    let timestamps: Vec<i64> = chart
        .get("timestamp")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    let closes: Vec<Option<f64>> = chart
        .pointer("/indicators/quote/0/close")
        .and_then(Value::as_array)
        .map(|a| a.iter().map(Value::as_f64).collect())
        .unwrap_or_default();
    let adjusted: Vec<Option<f64>> = chart
        .pointer("/indicators/adjclose/0/adjclose")
        .and_then(Value::as_array)
        .map(|a| a.iter().map(Value::as_f64).collect())
        .unwrap_or_default();

    let mut series = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let price = adjusted
            .get(i)
            .copied()
            .flatten()
            .or_else(|| closes.get(i).copied().flatten());
        let (Some(price), Some(datetime)) = (price, DateTime::<Utc>::from_timestamp(*ts, 0)) else {
            continue;
        };
        let date = datetime.date_naive();
        if let Some(cutoff) = end_date {
            if date > cutoff {
                continue;
            }
        }
        series.push((date, price));
    }
    series.sort_by_key(|(date, _)| *date);
    series
}

/// Inner join two series on date.
fn align_series(
    left: &[(NaiveDate, f64)],
    right: &[(NaiveDate, f64)],
) -> (Vec<f64>, Vec<f64>, Vec<NaiveDate>) {
    let mut left_prices = Vec::new();
    let mut right_prices = Vec::new();
    let mut dates = Vec::new();

    let mut i = 0;
    let mut j = 0;
    while i < left.len() && j < right.len() {
        match left[i].0.cmp(&right[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dates.push(left[i].0);
                left_prices.push(left[i].1);
                right_prices.push(right[j].1);
                i += 1;
                j += 1;
            }
        }
    }
    (left_prices, right_prices, dates)
}

fn returns_slice(prices: &[f64], start: usize) -> Vec<f64> {
    (start..prices.len())
        .map(|i| {
            if i == 0 || prices[i - 1] == 0.0 {
                0.0
            } else {
                prices[i] / prices[i - 1] - 1.0
            }
        })
        .collect()
}

//
// ================= Strategy Math =================
//

/// Per-day strategy state after the moving-average warmup.
struct StrategyFrame {
    /// First index of the aligned price vector covered by the frame.
    start: usize,
    prices: Vec<f64>,
    returns: Vec<f64>,
    ma_short: Vec<f64>,
    ma_long: Vec<f64>,
    positions: Vec<f64>,
    strategy_returns: Vec<f64>,
}

impl StrategyFrame {
    fn len(&self) -> usize {
        self.prices.len()
    }

    fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

fn compute_strategy(prices: &[f64], short_window: usize, long_window: usize) -> StrategyFrame {
    let n = prices.len();
    let start = long_window.max(2) - 1;
    let mut frame = StrategyFrame {
        start: start.min(n),
        prices: Vec::new(),
        returns: Vec::new(),
        ma_short: Vec::new(),
        ma_long: Vec::new(),
        positions: Vec::new(),
        strategy_returns: Vec::new(),
    };
    if n <= start {
        return frame;
    }

    let rolling_mean = |i: usize, window: usize| -> Option<f64> {
        if i + 1 < window {
            return None;
        }
        Some(prices[i + 1 - window..=i].iter().sum::<f64>() / window as f64)
    };
    // Signal is flat until both averages exist.
    let signal = |i: usize| -> f64 {
        match (rolling_mean(i, short_window), rolling_mean(i, long_window)) {
            (Some(short), Some(long)) if short > long => 1.0,
            _ => 0.0,
        }
    };

    for i in start..n {
        let ret = prices[i] / prices[i - 1] - 1.0;
        let position = if i == 0 { 0.0 } else { signal(i - 1) };

        frame.prices.push(prices[i]);
        frame.returns.push(ret);
        frame.ma_short.push(rolling_mean(i, short_window).unwrap_or(prices[i]));
        frame.ma_long.push(rolling_mean(i, long_window).unwrap_or(prices[i]));
        frame.positions.push(position);
        frame.strategy_returns.push(position * ret);
    }
    frame
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StrategyMetrics {
    pub cagr: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub hit_rate: f64,
    pub avg_gain: f64,
    pub avg_loss: f64,
    pub exposure: f64,
}

impl StrategyMetrics {
    fn to_json(self) -> Value {
        json!({
            "cagr": round4(self.cagr),
            "sharpe": round4(self.sharpe),
            "sortino": round4(self.sortino),
            "max_drawdown": round4(self.max_drawdown),
            "hit_rate": round4(self.hit_rate),
            "avg_gain": round4(self.avg_gain),
            "avg_loss": round4(self.avg_loss),
            "exposure": round4(self.exposure),
        })
    }
}

fn summarize(returns: &[f64], positions: &[f64], risk_free_rate: f64) -> StrategyMetrics {
    let cagr = annualized_return(returns);
    let vol = annualized_vol(returns);
    let downside = downside_vol(returns);

    let sharpe = if vol > 0.0 { (cagr - risk_free_rate) / vol } else { 0.0 };
    let sortino = if downside > 0.0 { (cagr - risk_free_rate) / downside } else { 0.0 };

    let (avg_gain, avg_loss) = average_gain_loss(returns);
    let exposure = mean(positions);

    StrategyMetrics {
        cagr,
        sharpe,
        sortino,
        max_drawdown: max_drawdown(returns),
        hit_rate: hit_rate(returns),
        avg_gain,
        avg_loss,
        exposure,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn annualized_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let cumulative: f64 = returns.iter().map(|r| 1.0 + r).product();
    if cumulative <= 0.0 {
        return 0.0;
    }
    cumulative.powf(TRADING_DAYS / returns.len() as f64) - 1.0
}

fn annualized_vol(returns: &[f64]) -> f64 {
    std_dev(returns) * TRADING_DAYS.sqrt()
}

fn downside_vol(returns: &[f64]) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return 0.0;
    }
    std_dev(&downside) * TRADING_DAYS.sqrt()
}

fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0f64;
    let mut peak = 1.0f64;
    let mut worst = 0.0f64;
    for r in returns {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        worst = worst.min(cumulative / peak - 1.0);
    }
    worst
}

fn hit_rate(returns: &[f64]) -> f64 {
    let gains = returns.iter().filter(|r| **r > 0.0).count();
    let losses = returns.iter().filter(|r| **r < 0.0).count();
    let total = gains + losses;
    if total == 0 {
        return 0.0;
    }
    gains as f64 / total as f64
}

fn average_gain_loss(returns: &[f64]) -> (f64, f64) {
    let gains: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    (mean(&gains), mean(&losses))
}

fn round4(value: f64) -> f64 {
    if value.is_nan() || value.is_infinite() {
        return 0.0;
    }
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annualized_return_of_steady_gain() {
        // 0.1% a day compounds to (1.001)^252 - 1 annualized.
        let returns = vec![0.001; 504];
        let expected = 1.001f64.powf(252.0) - 1.0;
        assert!((annualized_return(&returns) - expected).abs() < 1e-9);
        assert_eq!(annualized_return(&[]), 0.0);
    }

    #[test]
    fn test_max_drawdown_known_path() {
        // Up 10%, down 20%, up 5%: trough is 0.88 of the 1.10 peak.
        let returns = vec![0.10, -0.20, 0.05];
        assert!((max_drawdown(&returns) - (-0.20)).abs() < 1e-12);
        assert_eq!(max_drawdown(&[0.01, 0.02]), 0.0);
    }

    #[test]
    fn test_hit_rate_ignores_flat_days() {
        let returns = vec![0.01, -0.02, 0.0, 0.03];
        assert!((hit_rate(&returns) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_downside_vol_of_all_gains_is_zero() {
        assert_eq!(downside_vol(&[0.01, 0.02, 0.005]), 0.0);
        assert!(downside_vol(&[0.01, -0.02, -0.01]) > 0.0);
    }

    #[test]
    fn test_compute_strategy_goes_long_in_uptrend() {
        // Monotonic uptrend: short MA sits above long MA, so after warmup the
        // strategy should be fully invested.
        let prices: Vec<f64> = (1..=120).map(|i| 100.0 + i as f64).collect();
        let frame = compute_strategy(&prices, 5, 20);

        assert!(!frame.is_empty());
        assert_eq!(frame.start, 19);
        assert!(frame.positions.iter().skip(1).all(|p| *p == 1.0));
        assert!(frame.ma_short.last().unwrap() > frame.ma_long.last().unwrap());
        // Strategy returns equal raw returns while fully invested.
        let last = frame.len() - 1;
        assert!((frame.strategy_returns[last] - frame.returns[last]).abs() < 1e-12);
    }

    #[test]
    fn test_compute_strategy_stays_flat_in_downtrend() {
        let prices: Vec<f64> = (1..=120).map(|i| 500.0 - i as f64).collect();
        let frame = compute_strategy(&prices, 5, 20);

        assert!(frame.positions.iter().all(|p| *p == 0.0));
        assert!(frame.strategy_returns.iter().all(|r| *r == 0.0));
    }

    #[test]
    fn test_compute_strategy_short_history_is_empty() {
        let prices = vec![100.0; 10];
        let frame = compute_strategy(&prices, 5, 20);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_align_series_inner_join() {
        let d = |day: u32| NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
        let left = vec![(d(1), 10.0), (d(2), 11.0), (d(4), 12.0)];
        let right = vec![(d(2), 100.0), (d(3), 101.0), (d(4), 102.0)];

        let (l, r, dates) = align_series(&left, &right);
        assert_eq!(dates, vec![d(2), d(4)]);
        assert_eq!(l, vec![11.0, 12.0]);
        assert_eq!(r, vec![100.0, 102.0]);
    }

    #[test]
    fn test_params_reject_bad_windows() {
        let invocation = ToolInvocation {
            tool_name: "evaluate_long_strategy".to_string(),
            parameters: json!({"ticker": "NVDA", "short_window": 63, "long_window": 21}),
        };
        assert!(StrategyParams::parse(&invocation).is_err());

        let ok = ToolInvocation {
            tool_name: "evaluate_long_strategy".to_string(),
            parameters: json!({"ticker": "nvda"}),
        };
        let params = StrategyParams::parse(&ok).unwrap();
        assert_eq!(params.ticker, "NVDA");
        assert_eq!(params.benchmark, "SPY");
        assert_eq!(params.short_window, 21);
        assert_eq!(params.long_window, 63);
    }
}
