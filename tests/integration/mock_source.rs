//! Mock market data source for integration testing.
//!
//! Provides a deterministic `MarketDataSource` implementation that serves
//! known histories and records every request, all in-memory with no
//! network access.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gapscan::providers::MarketDataSource;
use gapscan::types::{PriceBar, ProviderError, Quote, Symbol};

/// A mock source for deterministic testing.
///
/// Symbols without a configured history answer `NotFound`.
pub struct MockSource {
    name: &'static str,
    histories: HashMap<Symbol, Vec<PriceBar>>,
    requests: Arc<Mutex<Vec<String>>>,
    /// If set, all requests return this error.
    force_error: Arc<Mutex<Option<ProviderError>>>,
}

impl MockSource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            histories: HashMap::new(),
            requests: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Serve `bars` for `symbol` (builder style).
    pub fn with_history(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.histories.insert(Symbol::parse(symbol).unwrap(), bars);
        self
    }

    /// Force all subsequent requests to fail.
    pub fn set_error(&self, err: ProviderError) {
        *self.force_error.lock().unwrap() = Some(err);
    }

    /// Requests seen so far, as `"quote:SYM"` / `"history:SYM"`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn serve(&self, kind: &str, symbol: &Symbol) -> Result<&Vec<PriceBar>, ProviderError> {
        self.requests.lock().unwrap().push(format!("{kind}:{symbol}"));
        if let Some(err) = self.force_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.histories
            .get(symbol)
            .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))
    }
}

#[async_trait]
impl MarketDataSource for MockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError> {
        let bars = self.serve("quote", symbol)?;
        let last = bars.last().ok_or_else(|| ProviderError::Malformed("no bars".into()))?;
        let previous_close = if bars.len() >= 2 { bars[bars.len() - 2].close } else { 0.0 };
        // Price only, like sources that omit volume
        Ok(Quote {
            symbol: symbol.clone(),
            price: last.close,
            previous_close,
            volume: 0,
            average_volume: 0,
        })
    }

    async fn get_history(
        &self,
        symbol: &Symbol,
        _lookback_days: u32,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        // Newest first, to exercise normalisation downstream
        let mut bars = self.serve("history", symbol)?.clone();
        bars.reverse();
        Ok(bars)
    }
}

// ---------------------------------------------------------------------------
// Fixture histories
// ---------------------------------------------------------------------------

fn to_bars(closes: &[f64], volumes: &[u64]) -> Vec<PriceBar> {
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&c, &v))| PriceBar {
            timestamp: Utc.timestamp_opt(1_750_000_000 + i as i64 * 86_400, 0).unwrap(),
            open: c,
            high: c * 1.01,
            low: c * 0.99,
            close: c,
            volume: v,
        })
        .collect()
}

/// 60 sessions: flat at `base` for 40, a −10% gap, a short recovery to
/// 95% of `base`, then a tight sideways range closing at 94.9%.
///
/// With default thresholds this passes every technical stage. The last
/// five sessions trade `spike`× the usual 1M shares.
pub fn setup_history(base: f64, spike: f64) -> Vec<PriceBar> {
    let mut closes = vec![base; 40];
    closes.extend([0.90, 0.91, 0.92, 0.93, 0.94].iter().map(|m| base * m));
    for i in 45..59 {
        closes.push(base * if i % 2 == 1 { 0.95 } else { 0.955 });
    }
    closes.push(base * 0.949);

    let mut volumes = vec![1_000_000u64; closes.len()];
    let n = volumes.len();
    for v in &mut volumes[n - 5..] {
        *v = (1_000_000.0 * spike) as u64;
    }
    to_bars(&closes, &volumes)
}

/// Same shape as [`setup_history`] but the gap is a −25% collapse.
pub fn crash_history(base: f64) -> Vec<PriceBar> {
    let mut bars = setup_history(base, 1.0);
    let gap_close = base * 0.75;
    for bar in &mut bars[40..] {
        let c = bar.close - base * 0.15;
        bar.close = c.max(gap_close);
        bar.open = bar.close;
        bar.high = bar.close * 1.01;
        bar.low = bar.close * 0.99;
    }
    bars
}

/// Too few sessions for indicators.
pub fn short_history(base: f64, sessions: usize) -> Vec<PriceBar> {
    to_bars(&vec![base; sessions], &vec![1_000_000; sessions])
}
