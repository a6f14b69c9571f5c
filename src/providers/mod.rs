//! Market data sources.
//!
//! Defines the `MarketDataSource` trait and provides implementations for:
//! - Yahoo Finance chart API, primary, no key required
//! - Alpha Vantage, fallback, API key required
//!
//! The [`router::ProviderRouter`] walks an ordered list of sources and
//! only moves on to the next one when the previous fails.

pub mod alphavantage;
pub mod router;
pub mod yahoo;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{AppConfig, ProvidersConfig};
use crate::types::{PriceBar, ProviderError, Quote, Symbol};

use alphavantage::AlphaVantageClient;
use yahoo::YahooClient;

/// Abstraction over quote/history sources.
///
/// Any failure (transport, HTTP status, in-band error, malformed payload)
/// is reported as a `ProviderError`; the router decides what to do next.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Source name for logging and report attribution.
    fn name(&self) -> &'static str;

    /// Latest quote for a symbol.
    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError>;

    /// Daily bars covering roughly the last `lookback_days` sessions.
    /// Ordering is whatever the source returns; callers normalise.
    async fn get_history(
        &self,
        symbol: &Symbol,
        lookback_days: u32,
    ) -> Result<Vec<PriceBar>, ProviderError>;
}

/// Sort bars ascending by timestamp, drop duplicate timestamps (first kept)
/// and bars without a usable close.
pub fn normalize_history(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.retain(|b| b.close.is_finite() && b.close > 0.0);
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    bars
}

/// Build the configured sources in priority order.
pub fn build_sources(cfg: &ProvidersConfig) -> Result<Vec<Arc<dyn MarketDataSource>>> {
    let timeout = Duration::from_secs(cfg.timeout_secs);
    let mut sources: Vec<Arc<dyn MarketDataSource>> = Vec::with_capacity(cfg.sources.len());

    for name in &cfg.sources {
        let source: Arc<dyn MarketDataSource> = match name.as_str() {
            "yahoo" => Arc::new(YahooClient::new(timeout)?),
            "alphavantage" => {
                let key = AppConfig::resolve_secret(cfg.alphavantage_key_env.as_deref());
                Arc::new(AlphaVantageClient::new(key, timeout)?)
            }
            other => anyhow::bail!("Unknown data source: {other}"),
        };
        sources.push(source);
    }

    info!(
        sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
        "Data sources initialised"
    );
    Ok(sources)
}
