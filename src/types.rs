//! Shared types for the GAPSCAN screener.
//!
//! These types form the data model used across all modules. Every record
//! is created fresh during a scan and never mutated afterwards: each
//! pipeline stage derives a new record from the previous one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Symbol
// ---------------------------------------------------------------------------

/// An uppercase ticker symbol. Identity key for every downstream record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalise raw input (trim + uppercase). Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Symbol(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Symbol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::parse(s).ok_or_else(|| anyhow::anyhow!("Empty ticker symbol"))
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// One daily bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Latest quote snapshot for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: f64,
    pub previous_close: f64,
    /// Today's volume (0 when the source does not report it)
    pub volume: u64,
    /// Average daily volume (0 when the source does not report it)
    pub average_volume: u64,
}

impl Quote {
    /// A quote is only usable with a strictly positive, finite price.
    pub fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }

    /// Day-over-day change in percent, if a previous close is known.
    pub fn change_percent(&self) -> Option<f64> {
        if self.previous_close > 0.0 {
            Some((self.price - self.previous_close) / self.previous_close * 100.0)
        } else {
            None
        }
    }

    /// Derive a new quote whose missing volume fields are filled from history.
    ///
    /// Some sources only report price. Volume falls back to the last bar,
    /// average volume to the mean of the trailing 20 bars.
    pub fn with_history_volumes(&self, bars: &[PriceBar]) -> Quote {
        let mut quote = self.clone();
        if quote.volume == 0 {
            quote.volume = bars.last().map(|b| b.volume).unwrap_or(0);
        }
        if quote.average_volume == 0 && !bars.is_empty() {
            let window = &bars[bars.len().saturating_sub(20)..];
            let total: u64 = window.iter().map(|b| b.volume).sum();
            quote.average_volume = total / window.len() as u64;
        }
        quote
    }

    /// Volume figure used by the volume floor: average volume when known,
    /// otherwise today's volume.
    pub fn screening_volume(&self) -> u64 {
        if self.average_volume > 0 {
            self.average_volume
        } else {
            self.volume
        }
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ${:.2} (prev ${:.2} | vol {} | avg {})",
            self.symbol, self.price, self.previous_close, self.volume, self.average_volume,
        )
    }
}

// ---------------------------------------------------------------------------
// Derived records
// ---------------------------------------------------------------------------

/// Indicators derived from a symbol's history. Computed once per scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    /// RSI(14), 0–100 (50 when history is too short)
    pub rsi: f64,
    pub ma20: f64,
    pub ma50: f64,
    pub ma200: f64,
    /// Most negative single-day close-to-close change, in percent
    pub gap_percent: f64,
    /// Bars elapsed since the gap bar
    pub days_since_gap: usize,
    /// Recovery of the gap's drop, 0–100
    pub gap_fill_percent: f64,
    /// 5-bar high/low range as a percentage of the 5-bar low
    pub consolidation_percent: f64,
    /// Trailing 5-bar average volume vs the 5 bars before, in percent
    pub volume_trend_percent: f64,
    /// Trailing 5-bar average volume / trailing 20-bar average volume
    pub volume_spike_ratio: f64,
    /// Bounded composite of MA relationships and momentum, 0–100
    pub trend_score: f64,
    /// Number of bars the indicators were computed from
    pub bars: usize,
}

/// Short interest and float for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub short_interest_percent: f64,
    pub float_shares: u64,
    /// False when the values are table defaults rather than real entries
    pub from_table: bool,
}

/// A symbol that passed every filter stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: Symbol,
    pub quote: Quote,
    pub indicators: IndicatorSet,
    pub reference: ReferenceData,
    /// Which source produced the data (e.g. "yahoo", "alphavantage")
    pub source: String,
}

/// Option contract side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "CALL"),
            OptionType::Put => write!(f, "PUT"),
        }
    }
}

/// A synthesized near-the-money option idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionPlay {
    pub option_type: OptionType,
    pub strike: Decimal,
    /// Estimated premium per share (an approximation, not a market quote)
    pub premium: Decimal,
    pub otm_percent: f64,
}

impl fmt::Display for OptionPlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${} {} @ ${} ({:.1}% OTM)",
            self.strike, self.option_type, self.premium, self.otm_percent,
        )
    }
}

/// Per-factor contributions to a composite score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub rsi: f64,
    pub gap_fill: f64,
    pub consolidation: f64,
    pub volume: f64,
    pub short_interest: f64,
    pub ma_position: f64,
    pub recency: f64,
    pub trend: f64,
}

impl ScoreBreakdown {
    /// Raw sum of all sub-scores (may exceed 100).
    pub fn total(&self) -> f64 {
        self.rsi
            + self.gap_fill
            + self.consolidation
            + self.volume
            + self.short_interest
            + self.ma_position
            + self.recency
            + self.trend
    }
}

/// A scored candidate with its option plays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    /// Composite score, 0–100
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    /// At most three plays, nearest to the money first
    pub plays: Vec<OptionPlay>,
}

impl ScoredCandidate {
    pub fn symbol(&self) -> &Symbol {
        &self.candidate.symbol
    }
}

impl fmt::Display for ScoredCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ind = &self.candidate.indicators;
        write!(
            f,
            "{} score={:.0} ${:.2} gap={:.1}% ({}d ago, {:.0}% filled) range={:.1}% rsi={:.0} SI={:.1}%",
            self.candidate.symbol,
            self.score,
            self.candidate.quote.price,
            ind.gap_percent,
            ind.days_since_gap,
            ind.gap_fill_percent,
            ind.consolidation_percent,
            ind.rsi,
            self.candidate.reference.short_interest_percent,
        )?;
        if let Some(best) = self.plays.first() {
            write!(f, " | best: {best}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure of a single data source for a single request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Symbol not found: {0}")]
    NotFound(String),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Missing API key for {0}")]
    MissingApiKey(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs can carry API keys in the query string
        let err = err.without_url();
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Domain-specific error types for GAPSCAN.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("All providers failed for {symbol} {request}: {last_error}")]
    ProviderUnavailable {
        symbol: Symbol,
        request: &'static str,
        last_error: String,
    },

    #[error("Insufficient history for {symbol}: have {have} bars, need {need}")]
    InsufficientHistory {
        symbol: Symbol,
        have: usize,
        need: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
