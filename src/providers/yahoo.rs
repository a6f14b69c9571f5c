//! Yahoo Finance chart API source.
//!
//! API: `https://query1.finance.yahoo.com/v8/finance/chart/{symbol}`
//! Auth: None required.
//! Both the quote and the history come from the chart endpoint; the quote
//! is read from the chart `meta` block plus the last sessions' bars.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::MarketDataSource;
use crate::types::{PriceBar, ProviderError, Quote, Symbol};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SOURCE_NAME: &str = "yahoo";

/// Calendar days requested for a quote (enough for a 20-session volume average).
const QUOTE_WINDOW_DAYS: i64 = 35;

// ---------------------------------------------------------------------------
// API response types (Yahoo JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    regular_market_volume: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

/// Parallel arrays; Yahoo uses `null` for sessions without a print.
#[derive(Debug, Deserialize, Default)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct YahooClient {
    http: Client,
}

impl YahooClient {
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (GAPSCAN/0.1.0)")
            .build()
            .context("Failed to build HTTP client for Yahoo")?;
        Ok(Self { http })
    }

    /// Fetch the chart for the last `days` calendar days.
    async fn fetch_chart(&self, symbol: &Symbol, days: i64) -> Result<ChartResult, ProviderError> {
        let now = Utc::now();
        let from = now - Duration::days(days);
        let url = format!(
            "{BASE_URL}/{}?period1={}&period2={}&interval=1d",
            urlencoding::encode(symbol.as_str()),
            from.timestamp(),
            now.timestamp(),
        );

        debug!(symbol = %symbol, url = %url, "Fetching Yahoo chart");

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(format!("Yahoo {status}")));
        }
        // Yahoo answers 404 with a chart error body; let the parser classify it.
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        parse_chart(symbol, &body)
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Parse a chart payload, mapping Yahoo's in-band error object.
fn parse_chart(symbol: &Symbol, body: &str) -> Result<ChartResult, ProviderError> {
    let parsed: ChartResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("Yahoo chart: {e}")))?;

    if let Some(err) = parsed.chart.error {
        return Err(if err.code.eq_ignore_ascii_case("not found") {
            ProviderError::NotFound(symbol.to_string())
        } else {
            ProviderError::Malformed(format!("{}: {}", err.code, err.description))
        });
    }

    parsed
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))
}

/// Zip the parallel arrays into bars, skipping sessions without a close.
fn chart_bars(result: &ChartResult) -> Result<Vec<PriceBar>, ProviderError> {
    let Some(q) = result.indicators.quote.first() else {
        return Ok(Vec::new());
    };

    let at = |v: &Vec<Option<f64>>, i: usize| v.get(i).copied().flatten();
    let mut bars = Vec::with_capacity(result.timestamp.len());

    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(close) = at(&q.close, i) else {
            continue;
        };
        let timestamp = Utc
            .timestamp_opt(ts, 0)
            .single()
            .ok_or_else(|| ProviderError::Malformed(format!("bad timestamp {ts}")))?;
        bars.push(PriceBar {
            timestamp,
            open: at(&q.open, i).unwrap_or(close),
            high: at(&q.high, i).unwrap_or(close),
            low: at(&q.low, i).unwrap_or(close),
            close,
            volume: at(&q.volume, i).unwrap_or(0.0).max(0.0) as u64,
        });
    }
    Ok(bars)
}

/// Build a quote from the chart meta plus its bars.
fn chart_quote(symbol: &Symbol, result: &ChartResult) -> Result<Quote, ProviderError> {
    let bars = super::normalize_history(chart_bars(result)?);

    let price = result
        .meta
        .regular_market_price
        .or_else(|| bars.last().map(|b| b.close))
        .ok_or_else(|| ProviderError::Malformed("Yahoo chart has no price".into()))?;

    // Second-to-last session is yesterday's close when today's bar is present.
    let previous_close = if bars.len() >= 2 {
        bars[bars.len() - 2].close
    } else {
        result.meta.previous_close.unwrap_or(0.0)
    };

    let volume = result
        .meta
        .regular_market_volume
        .map(|v| v.max(0.0) as u64)
        .or_else(|| bars.last().map(|b| b.volume))
        .unwrap_or(0);

    let window = &bars[bars.len().saturating_sub(20)..];
    let average_volume = if window.is_empty() {
        0
    } else {
        window.iter().map(|b| b.volume).sum::<u64>() / window.len() as u64
    };

    Ok(Quote {
        symbol: symbol.clone(),
        price,
        previous_close,
        volume,
        average_volume,
    })
}

#[async_trait]
impl MarketDataSource for YahooClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError> {
        let result = self.fetch_chart(symbol, QUOTE_WINDOW_DAYS).await?;
        chart_quote(symbol, &result)
    }

    async fn get_history(
        &self,
        symbol: &Symbol,
        lookback_days: u32,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        // Sessions → calendar days, with a week of slack for holidays.
        let days = lookback_days as i64 * 7 / 5 + 7;
        let result = self.fetch_chart(symbol, days).await?;
        chart_bars(&result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
