//! Ordered fallback across data sources.
//!
//! Each request (quote, history) walks the sources in priority order and
//! stops at the first usable answer. There are no retries and no backoff:
//! a source gets exactly one attempt per request.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{normalize_history, MarketDataSource};
use crate::types::{PriceBar, ProviderError, Quote, ScanError, Symbol};

/// Quote and history for one symbol, with the source that served each.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub quote: Quote,
    pub bars: Vec<PriceBar>,
    pub quote_source: &'static str,
    pub history_source: &'static str,
}

/// Routes requests to the first source that answers.
pub struct ProviderRouter {
    sources: Vec<Arc<dyn MarketDataSource>>,
}

impl ProviderRouter {
    /// Sources in priority order: the first is primary.
    pub fn new(sources: Vec<Arc<dyn MarketDataSource>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Fetch a usable quote (strictly positive price).
    pub async fn fetch_quote(&self, symbol: &Symbol) -> Result<(Quote, &'static str), ScanError> {
        let mut last_error = ProviderError::NotFound("no sources configured".into());

        for (attempt, source) in self.sources.iter().enumerate() {
            let outcome = match source.get_quote(symbol).await {
                Ok(q) if q.is_usable() => Ok(q),
                Ok(q) => Err(ProviderError::Malformed(format!("non-positive price {}", q.price))),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(quote) => {
                    if attempt > 0 {
                        debug!(symbol = %symbol, source = source.name(), "Quote served by fallback");
                    }
                    return Ok((quote, source.name()));
                }
                Err(e) => {
                    warn!(symbol = %symbol, source = source.name(), error = %e, "Quote fetch failed");
                    last_error = e;
                }
            }
        }

        Err(ScanError::ProviderUnavailable {
            symbol: symbol.clone(),
            request: "quote",
            last_error: last_error.to_string(),
        })
    }

    /// Fetch a non-empty, ascending history of at most `lookback_days` bars.
    pub async fn fetch_history(
        &self,
        symbol: &Symbol,
        lookback_days: u32,
    ) -> Result<(Vec<PriceBar>, &'static str), ScanError> {
        let mut last_error = ProviderError::NotFound("no sources configured".into());

        for (attempt, source) in self.sources.iter().enumerate() {
            let outcome = match source.get_history(symbol, lookback_days).await {
                Ok(raw) => {
                    let mut bars = normalize_history(raw);
                    let keep = lookback_days as usize;
                    if bars.len() > keep {
                        bars.drain(..bars.len() - keep);
                    }
                    if bars.is_empty() {
                        Err(ProviderError::Malformed("empty history".into()))
                    } else {
                        Ok(bars)
                    }
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(bars) => {
                    if attempt > 0 {
                        debug!(symbol = %symbol, source = source.name(), "History served by fallback");
                    }
                    return Ok((bars, source.name()));
                }
                Err(e) => {
                    warn!(symbol = %symbol, source = source.name(), error = %e, "History fetch failed");
                    last_error = e;
                }
            }
        }

        Err(ScanError::ProviderUnavailable {
            symbol: symbol.clone(),
            request: "history",
            last_error: last_error.to_string(),
        })
    }

    /// Fetch quote and history concurrently; both are required.
    pub async fn fetch(&self, symbol: &Symbol, lookback_days: u32) -> Result<MarketSnapshot, ScanError> {
        let (quote, history) = tokio::join!(
            self.fetch_quote(symbol),
            self.fetch_history(symbol, lookback_days),
        );
        let (quote, quote_source) = quote?;
        let (bars, history_source) = history?;

        Ok(MarketSnapshot {
            quote: quote.with_history_volumes(&bars),
            bars,
            quote_source,
            history_source,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
