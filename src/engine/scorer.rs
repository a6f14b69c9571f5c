//! Composite scoring of filtered candidates.
//!
//! Eight factors, each mapped through a small tier table, summed and
//! clamped to 0–100. The tables below are the whole policy; nothing else
//! in the crate knows about point values.

use tracing::debug;

use crate::types::{Candidate, ScoreBreakdown};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Upper bound of the composite score.
pub const MAX_SCORE: f64 = 100.0;

/// RSI: lower is better (oversold). `(upper bound, points)`.
const RSI_TIERS: &[(f64, f64)] = &[(30.0, 20.0), (40.0, 15.0), (50.0, 10.0), (60.0, 5.0)];

/// Gap fill: a partial recovery scores best, a full fill leaves no room.
const GAP_FILL_SWEET_SPOT: (f64, f64) = (25.0, 60.0);
const GAP_FILL_SWEET_POINTS: f64 = 20.0;
const GAP_FILL_EARLY: (f64, f64) = (10.0, 25.0);
const GAP_FILL_EARLY_POINTS: f64 = 12.0;
const GAP_FILL_LATE: (f64, f64) = (60.0, 80.0);
const GAP_FILL_LATE_POINTS: f64 = 8.0;
const GAP_FILL_OTHER_POINTS: f64 = 3.0;

/// Consolidation range: tighter is better. `(upper bound, points)`.
const CONSOLIDATION_TIERS: &[(f64, f64)] = &[(3.0, 15.0), (5.0, 10.0), (8.0, 5.0)];

/// Volume spike ratio: higher is better. `(lower bound, points)`.
const VOLUME_TIERS: &[(f64, f64)] = &[(2.0, 10.0), (1.5, 7.0), (1.2, 4.0)];

/// Short interest percent: higher is better. `(lower bound, points)`.
const SHORT_INTEREST_TIERS: &[(f64, f64)] = &[(20.0, 15.0), (15.0, 12.0), (10.0, 8.0), (5.0, 4.0)];

/// Points for price above each of MA20 and MA50.
const MA_POSITION_POINTS: f64 = 5.0;

/// Days since the gap: fresher is better. `(upper bound, points)`.
const RECENCY_TIERS: &[(usize, f64)] = &[(3, 10.0), (7, 7.0), (14, 4.0)];

/// Trend score: higher is better. `(lower bound, points)`.
const TREND_TIERS: &[(f64, f64)] = &[(70.0, 10.0), (55.0, 7.0), (40.0, 4.0)];

// ---------------------------------------------------------------------------
// Tier helpers
// ---------------------------------------------------------------------------

/// First tier whose upper bound is >= value.
fn at_most(value: f64, tiers: &[(f64, f64)]) -> f64 {
    tiers
        .iter()
        .find(|(bound, _)| value <= *bound)
        .map(|(_, pts)| *pts)
        .unwrap_or(0.0)
}

/// First tier whose lower bound is <= value.
fn at_least(value: f64, tiers: &[(f64, f64)]) -> f64 {
    tiers
        .iter()
        .find(|(bound, _)| value >= *bound)
        .map(|(_, pts)| *pts)
        .unwrap_or(0.0)
}

fn within(value: f64, (lo, hi): (f64, f64)) -> bool {
    value >= lo && value <= hi
}

// ---------------------------------------------------------------------------
// Factors
// ---------------------------------------------------------------------------

pub fn rsi_points(rsi: f64) -> f64 {
    at_most(rsi, RSI_TIERS)
}

pub fn gap_fill_points(fill: f64) -> f64 {
    if within(fill, GAP_FILL_SWEET_SPOT) {
        GAP_FILL_SWEET_POINTS
    } else if fill >= GAP_FILL_EARLY.0 && fill < GAP_FILL_EARLY.1 {
        GAP_FILL_EARLY_POINTS
    } else if fill > GAP_FILL_LATE.0 && fill <= GAP_FILL_LATE.1 {
        GAP_FILL_LATE_POINTS
    } else {
        GAP_FILL_OTHER_POINTS
    }
}

pub fn consolidation_points(range_percent: f64) -> f64 {
    at_most(range_percent, CONSOLIDATION_TIERS)
}

pub fn volume_points(spike_ratio: f64) -> f64 {
    at_least(spike_ratio, VOLUME_TIERS)
}

pub fn short_interest_points(short_interest: f64) -> f64 {
    at_least(short_interest, SHORT_INTEREST_TIERS)
}

pub fn ma_position_points(price: f64, ma20: f64, ma50: f64) -> f64 {
    let mut pts = 0.0;
    if price > ma20 {
        pts += MA_POSITION_POINTS;
    }
    if price > ma50 {
        pts += MA_POSITION_POINTS;
    }
    pts
}

pub fn recency_points(days_since_gap: usize) -> f64 {
    RECENCY_TIERS
        .iter()
        .find(|(bound, _)| days_since_gap <= *bound)
        .map(|(_, pts)| *pts)
        .unwrap_or(0.0)
}

pub fn trend_points(trend_score: f64) -> f64 {
    at_least(trend_score, TREND_TIERS)
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct Scorer;

impl Scorer {
    /// Per-factor contributions for a candidate.
    pub fn breakdown(candidate: &Candidate) -> ScoreBreakdown {
        let ind = &candidate.indicators;
        ScoreBreakdown {
            rsi: rsi_points(ind.rsi),
            gap_fill: gap_fill_points(ind.gap_fill_percent),
            consolidation: consolidation_points(ind.consolidation_percent),
            volume: volume_points(ind.volume_spike_ratio),
            short_interest: short_interest_points(candidate.reference.short_interest_percent),
            ma_position: ma_position_points(candidate.quote.price, ind.ma20, ind.ma50),
            recency: recency_points(ind.days_since_gap),
            trend: trend_points(ind.trend_score),
        }
    }

    /// Composite score in [0, 100] plus the breakdown it came from.
    pub fn score(candidate: &Candidate) -> (f64, ScoreBreakdown) {
        let breakdown = Self::breakdown(candidate);
        let score = breakdown.total().clamp(0.0, MAX_SCORE);

        debug!(
            symbol = %candidate.symbol,
            score,
            raw = breakdown.total(),
            "Candidate scored"
        );

        (score, breakdown)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
