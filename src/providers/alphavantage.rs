//! Alpha Vantage source.
//!
//! API: `https://www.alphavantage.co/query`
//! Auth: API key via `apikey` query param. Free registration.
//! Rate limit: 25 req/day on the free tier, reported in-band as a
//! `Note` / `Information` message with HTTP 200.
//!
//! The daily series comes back as a date-keyed JSON object, so the bars
//! are unordered until the router normalises them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::MarketDataSource;
use crate::types::{PriceBar, ProviderError, Quote, Symbol};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://www.alphavantage.co/query";
const SOURCE_NAME: &str = "alphavantage";

/// `compact` returns the latest 100 sessions, enough for any lookback we use.
const OUTPUT_SIZE: &str = "compact";

// ---------------------------------------------------------------------------
// API response types (Alpha Vantage JSON → Rust)
// ---------------------------------------------------------------------------

/// Every response shares this envelope; failures arrive in-band.
#[derive(Debug, Deserialize, Default)]
struct Envelope {
    #[serde(rename = "Error Message", default)]
    error_message: Option<String>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
    #[serde(rename = "Information", default)]
    information: Option<String>,
    #[serde(rename = "Global Quote", default)]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Time Series (Daily)", default)]
    daily: Option<HashMap<String, DailyBar>>,
}

/// Numbers are strings in this API.
#[derive(Debug, Deserialize, Default)]
struct GlobalQuote {
    #[serde(rename = "05. price", default)]
    price: Option<String>,
    #[serde(rename = "06. volume", default)]
    volume: Option<String>,
    #[serde(rename = "08. previous close", default)]
    previous_close: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AlphaVantageClient {
    http: Client,
    api_key: Option<SecretString>,
    base_url: String,
}

impl AlphaVantageClient {
    /// `api_key` may be absent; every request then fails with
    /// `MissingApiKey` so the router can move on.
    pub fn new(api_key: Option<SecretString>, timeout: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("GAPSCAN/0.1.0")
            .build()
            .context("Failed to build HTTP client for Alpha Vantage")?;
        Ok(Self {
            http,
            api_key,
            base_url: BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    async fn query(&self, function: &str, symbol: &Symbol, extra: &str) -> Result<Envelope, ProviderError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::MissingApiKey(SOURCE_NAME.into()))?;

        let url = format!(
            "{}?function={function}&symbol={}{extra}&apikey={}",
            self.base_url,
            urlencoding::encode(symbol.as_str()),
            urlencoding::encode(key.expose_secret()),
        );

        debug!(symbol = %symbol, function, "Fetching Alpha Vantage");

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        parse_envelope(symbol, &body)
    }
}

/// Parse a response and surface in-band errors.
fn parse_envelope(symbol: &Symbol, body: &str) -> Result<Envelope, ProviderError> {
    let env: Envelope = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("Alpha Vantage: {e}")))?;

    if let Some(msg) = &env.error_message {
        debug!(symbol = %symbol, message = %msg, "Alpha Vantage error message");
        return Err(ProviderError::NotFound(symbol.to_string()));
    }
    if let Some(msg) = env.note.as_ref().or(env.information.as_ref()) {
        return Err(ProviderError::RateLimited(msg.chars().take(120).collect()));
    }
    Ok(env)
}

fn num<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T, ProviderError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ProviderError::Malformed(format!("bad {field}: {raw:?}")))
}

fn envelope_quote(symbol: &Symbol, env: Envelope) -> Result<Quote, ProviderError> {
    // Unknown symbols come back as an empty "Global Quote" object.
    let gq = env.global_quote.unwrap_or_default();
    let price = gq
        .price
        .as_deref()
        .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))?;

    Ok(Quote {
        symbol: symbol.clone(),
        price: num(price, "price")?,
        previous_close: match gq.previous_close.as_deref() {
            Some(p) => num(p, "previous close")?,
            None => 0.0,
        },
        volume: match gq.volume.as_deref() {
            Some(v) => num(v, "volume")?,
            None => 0,
        },
        // Not provided by GLOBAL_QUOTE; derived from history downstream.
        average_volume: 0,
    })
}

fn envelope_bars(symbol: &Symbol, env: Envelope) -> Result<Vec<PriceBar>, ProviderError> {
    let series = env
        .daily
        .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))?;

    series
        .into_iter()
        .map(|(date, bar)| {
            let day = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|_| ProviderError::Malformed(format!("bad date {date:?}")))?;
            let midnight = day
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| ProviderError::Malformed(format!("bad date {date:?}")))?;
            Ok(PriceBar {
                timestamp: Utc.from_utc_datetime(&midnight),
                open: num(&bar.open, "open")?,
                high: num(&bar.high, "high")?,
                low: num(&bar.low, "low")?,
                close: num(&bar.close, "close")?,
                volume: num(&bar.volume, "volume")?,
            })
        })
        .collect()
}

#[async_trait]
impl MarketDataSource for AlphaVantageClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError> {
        let env = self.query("GLOBAL_QUOTE", symbol, "").await?;
        envelope_quote(symbol, env)
    }

    async fn get_history(
        &self,
        symbol: &Symbol,
        lookback_days: u32,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let env = self
            .query("TIME_SERIES_DAILY", symbol, &format!("&outputsize={OUTPUT_SIZE}"))
            .await?;
        let mut bars = super::normalize_history(envelope_bars(symbol, env)?);
        let keep = lookback_days as usize;
        if bars.len() > keep {
            bars.drain(..bars.len() - keep);
        }
        Ok(bars)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
