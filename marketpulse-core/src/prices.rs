//! Price-feed collaborator interface and the default chart-API provider.
//!
//! The pipeline only depends on the [`PriceProvider`] trait; the concrete
//! provider fetches daily OHLCV bars from the public v8 chart endpoint with
//! bounded retries. The feed has no official API contract and is subject to
//! unannounced format changes.

use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Daily OHLCV bar for one symbol. Read-only input to feature construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Errors from the price feed.
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by price feed (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("price feed error: {0}")]
    Other(String),
}

/// Abstraction over the external price feed, mockable in tests.
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily bars for a symbol over an inclusive date range,
    /// sorted by date ascending.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PriceError>;
}

/// Fetch the trailing `days` calendar days of bars for a symbol.
pub fn recent_history(
    provider: &dyn PriceProvider,
    symbol: &str,
    days: i64,
) -> Result<Vec<PriceBar>, PriceError> {
    let end = chrono::Local::now().date_naive();
    let start = end - chrono::Duration::days(days);
    provider.fetch(symbol, start, end)
}

// ── Chart API response shape ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

/// Default provider backed by the public v8 chart endpoint.
pub struct ChartApiProvider {
    client: reqwest::blocking::Client,
    max_retries: u32,
    base_delay: Duration,
}

impl ChartApiProvider {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }

    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let end_ts = end.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp();
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval=1d"
        )
    }

    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<PriceBar>, PriceError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    PriceError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    PriceError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                PriceError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| PriceError::ResponseFormatChanged("result array is empty".into()))?;

        let timestamps = data
            .timestamp
            .ok_or_else(|| PriceError::ResponseFormatChanged("no timestamps".into()))?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| PriceError::ResponseFormatChanged("no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    PriceError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            // All-None rows are non-trading days; drop them.
            let Some(close) = close else {
                continue;
            };

            bars.push(PriceBar {
                symbol: symbol.to_string(),
                date,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close,
                volume: volume.unwrap_or(0),
            });
        }

        if bars.is_empty() {
            return Err(PriceError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn fetch_with_retry(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PriceError> {
        let url = Self::chart_url(symbol, start, end);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                std::thread::sleep(delay);
            }

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(PriceError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if !status.is_success() {
                        last_error = Some(PriceError::Other(format!("HTTP {status} for {symbol}")));
                        continue;
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        PriceError::ResponseFormatChanged(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;

                    return Self::parse_response(symbol, chart);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(PriceError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(PriceError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PriceError::Other("max retries exceeded".into())))
    }
}

impl Default for ChartApiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceProvider for ChartApiProvider {
    fn name(&self) -> &str {
        "chart_api"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PriceError> {
        self.fetch_with_retry(symbol, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_url_contains_range_and_interval() {
        let url = ChartApiProvider::chart_url(
            "RELIANCE.NS",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert!(url.contains("/chart/RELIANCE.NS"));
        assert!(url.contains("interval=1d"));
        assert!(url.contains("period1="));
        assert!(url.contains("period2="));
    }

    #[test]
    fn parse_response_skips_non_trading_days() {
        let json = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1709596800, 1709683200, 1709769600],
                    "indicators": {
                        "quote": [{
                            "open":   [100.0, null, 102.0],
                            "high":   [101.0, null, 103.0],
                            "low":    [99.0,  null, 101.0],
                            "close":  [100.5, null, 102.5],
                            "volume": [1000,  null, 1200]
                        }]
                    }
                }],
                "error": null
            }
        }"#;
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        let bars = ChartApiProvider::parse_response("TCS.NS", resp).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 100.5);
        assert_eq!(bars[1].close, 102.5);
        assert!(bars[0].date < bars[1].date);
    }

    #[test]
    fn parse_response_not_found_maps_to_symbol_error() {
        let json = r#"{
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found" }
            }
        }"#;
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        let err = ChartApiProvider::parse_response("BOGUS", resp).unwrap_err();
        assert!(matches!(err, PriceError::SymbolNotFound { .. }));
    }
}
