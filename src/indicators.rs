//! Technical indicator engine.
//!
//! Pure functions over an ascending daily bar series. Short histories
//! degrade gracefully (neutral RSI, shorter moving-average windows) except
//! below the flat minimum needed for gap and consolidation detection.
//!
//! The trend-score point values below are tuned policy constants, kept
//! together here so they can be adjusted without touching the algorithm.

use tracing::debug;

use crate::types::{IndicatorSet, PriceBar, ScanError, Symbol};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// RSI lookback.
pub const RSI_PERIOD: usize = 14;

/// RSI reported when history is too short or price never moved.
pub const NEUTRAL_RSI: f64 = 50.0;

/// Minimum bars for a symbol to be screened at all.
pub const MIN_BARS: usize = RSI_PERIOD + 1;

/// Trailing bars used for the consolidation range.
pub const CONSOLIDATION_WINDOW: usize = 5;

/// Short volume window (compared against the window before it).
const VOLUME_SHORT_WINDOW: usize = 5;

/// Baseline volume window for the spike ratio.
const VOLUME_BASELINE_WINDOW: usize = 20;

// Trend score policy
const TREND_BASE: f64 = 50.0;
const TREND_PRICE_VS_MA20: f64 = 10.0;
const TREND_PRICE_VS_MA50: f64 = 10.0;
const TREND_MA_BULLISH: f64 = 10.0;
const TREND_MA_BEARISH: f64 = -10.0;
const TREND_MA_NEAR_CROSS: f64 = 5.0;
/// MA20 within this fraction of MA50 counts as a near-crossover.
const TREND_NEAR_CROSS_BAND: f64 = 0.01;
const TREND_MOMENTUM_WINDOW: usize = 10;
/// Momentum move (percent) needed to score.
const TREND_MOMENTUM_THRESHOLD: f64 = 2.0;
const TREND_MOMENTUM_POINTS: f64 = 10.0;
const TREND_HIGHER_HIGHS_WINDOW: usize = 20;
const TREND_HIGHER_HIGHS_STRONG: usize = 12;
const TREND_HIGHER_HIGHS_STRONG_POINTS: f64 = 10.0;
const TREND_HIGHER_HIGHS_MODERATE: usize = 8;
const TREND_HIGHER_HIGHS_MODERATE_POINTS: f64 = 5.0;
const TREND_HIGHER_HIGHS_WEAK: usize = 4;
const TREND_HIGHER_HIGHS_WEAK_POINTS: f64 = -5.0;
const TREND_PRICE_VS_MA200: f64 = 10.0;

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Simple moving average of the trailing `window` values.
/// `None` when fewer than `window` values exist.
pub fn sma(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    mean(&values[values.len() - window..])
}

/// RSI over the trailing `period` changes, using simple average gain/loss.
///
/// Returns [`NEUTRAL_RSI`] with fewer than `period + 1` closes, and when
/// the window contains no movement at all.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return NEUTRAL_RSI;
    }

    let window = &closes[closes.len() - period - 1..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for pair in window.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { NEUTRAL_RSI } else { 100.0 };
    }

    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// MA20/MA50/MA200 with shorter-window fallback.
///
/// MA20 falls back to the mean of all bars, MA50 to MA20, MA200 to MA50.
pub fn moving_averages(closes: &[f64]) -> (f64, f64, f64) {
    let ma20 = sma(closes, 20).or_else(|| mean(closes)).unwrap_or(0.0);
    let ma50 = sma(closes, 50).unwrap_or(ma20);
    let ma200 = sma(closes, 200).unwrap_or(ma50);
    (ma20, ma50, ma200)
}

/// The largest single-day drop in a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gap {
    /// Close-to-close change in percent (negative for a drop)
    pub percent: f64,
    /// Index of the bar that closed after the drop
    pub index: usize,
    /// Close on the gap bar
    pub close: f64,
    /// Close on the bar before the gap
    pub prior_close: f64,
}

/// Find the most negative consecutive-day percentage change.
/// Earliest bar wins ties. `None` with fewer than two usable closes.
pub fn detect_gap(closes: &[f64]) -> Option<Gap> {
    let mut best: Option<Gap> = None;
    for i in 1..closes.len() {
        let prior = closes[i - 1];
        if prior <= 0.0 {
            continue;
        }
        let percent = (closes[i] - prior) / prior * 100.0;
        if best.map_or(true, |g| percent < g.percent) {
            best = Some(Gap {
                percent,
                index: i,
                close: closes[i],
                prior_close: prior,
            });
        }
    }
    best
}

/// How much of the gap's drop has been recovered, as a percentage of the
/// drop, clamped to 0–100. Anything at or below the gap close is 0, anything
/// at or above the pre-gap close is 100. A non-drop "gap" is 0.
pub fn gap_fill_percent(gap: &Gap, current: f64) -> f64 {
    let magnitude = gap.prior_close - gap.close;
    if magnitude <= 0.0 || !current.is_finite() {
        return 0.0;
    }
    ((current - gap.close) / magnitude * 100.0).clamp(0.0, 100.0)
}

/// `(max(high) − min(low)) / min(low) × 100` over the trailing `window` bars.
pub fn consolidation_percent(bars: &[PriceBar], window: usize) -> f64 {
    if bars.is_empty() || window == 0 {
        return 0.0;
    }
    let tail = &bars[bars.len().saturating_sub(window)..];
    let high = tail.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = tail.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    if low <= 0.0 {
        return 0.0;
    }
    (high - low) / low * 100.0
}

/// Percent change of the trailing short-window average volume against the
/// same-length window immediately before it.
pub fn volume_trend_percent(volumes: &[f64]) -> f64 {
    let n = VOLUME_SHORT_WINDOW;
    if volumes.len() < 2 * n {
        return 0.0;
    }
    let recent = mean(&volumes[volumes.len() - n..]).unwrap_or(0.0);
    let prior = mean(&volumes[volumes.len() - 2 * n..volumes.len() - n]).unwrap_or(0.0);
    if prior <= 0.0 {
        return 0.0;
    }
    (recent - prior) / prior * 100.0
}

/// Trailing short-window average volume over the trailing baseline average.
/// 1.0 when there is no baseline to compare against.
pub fn volume_spike_ratio(volumes: &[f64]) -> f64 {
    if volumes.is_empty() {
        return 1.0;
    }
    let recent = mean(&volumes[volumes.len().saturating_sub(VOLUME_SHORT_WINDOW)..]).unwrap_or(0.0);
    let baseline =
        mean(&volumes[volumes.len().saturating_sub(VOLUME_BASELINE_WINDOW)..]).unwrap_or(0.0);
    if baseline <= 0.0 {
        return 1.0;
    }
    recent / baseline
}

/// Bounded trend score. Starts at 50, accumulates signed deltas, and is
/// clamped to 0–100 only at the end.
pub fn trend_score(bars: &[PriceBar], ma20: f64, ma50: f64, ma200: f64) -> f64 {
    let Some(last) = bars.last() else {
        return TREND_BASE;
    };
    let price = last.close;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mut score = TREND_BASE;

    // (a) price vs MA20
    score += if price > ma20 { TREND_PRICE_VS_MA20 } else { -TREND_PRICE_VS_MA20 };

    // (b) price vs MA50
    score += if price > ma50 { TREND_PRICE_VS_MA50 } else { -TREND_PRICE_VS_MA50 };

    // (c) MA20 vs MA50 ordering
    if ma50 > 0.0 {
        let spread = (ma20 - ma50) / ma50;
        score += if spread.abs() <= TREND_NEAR_CROSS_BAND {
            TREND_MA_NEAR_CROSS
        } else if spread > 0.0 {
            TREND_MA_BULLISH
        } else {
            TREND_MA_BEARISH
        };
    }

    // (d) momentum: last window vs the window before
    let w = TREND_MOMENTUM_WINDOW;
    if closes.len() >= 2 * w {
        let recent = mean(&closes[closes.len() - w..]).unwrap_or(0.0);
        let prior = mean(&closes[closes.len() - 2 * w..closes.len() - w]).unwrap_or(0.0);
        if prior > 0.0 {
            let change = (recent - prior) / prior * 100.0;
            if change > TREND_MOMENTUM_THRESHOLD {
                score += TREND_MOMENTUM_POINTS;
            } else if change < -TREND_MOMENTUM_THRESHOLD {
                score -= TREND_MOMENTUM_POINTS;
            }
        }
    }

    // (e) higher-high days in the trailing window
    let tail = &bars[bars.len().saturating_sub(TREND_HIGHER_HIGHS_WINDOW)..];
    let higher_highs = tail.windows(2).filter(|p| p[1].high > p[0].high).count();
    if higher_highs >= TREND_HIGHER_HIGHS_STRONG {
        score += TREND_HIGHER_HIGHS_STRONG_POINTS;
    } else if higher_highs >= TREND_HIGHER_HIGHS_MODERATE {
        score += TREND_HIGHER_HIGHS_MODERATE_POINTS;
    } else if higher_highs <= TREND_HIGHER_HIGHS_WEAK {
        score += TREND_HIGHER_HIGHS_WEAK_POINTS;
    }

    // (f) long-term trend, only with a real 200-bar average
    if bars.len() >= 200 {
        score += if price > ma200 { TREND_PRICE_VS_MA200 } else { -TREND_PRICE_VS_MA200 };
    }

    score.clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Engine entry point
// ---------------------------------------------------------------------------

/// Compute the full indicator set for a symbol's ascending bar series.
pub fn compute(symbol: &Symbol, bars: &[PriceBar]) -> Result<IndicatorSet, ScanError> {
    if bars.len() < MIN_BARS {
        return Err(ScanError::InsufficientHistory {
            symbol: symbol.clone(),
            have: bars.len(),
            need: MIN_BARS,
        });
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
    let current = closes[closes.len() - 1];

    let (ma20, ma50, ma200) = moving_averages(&closes);

    let (gap_percent, days_since_gap, gap_fill) = match detect_gap(&closes) {
        Some(gap) => (
            gap.percent,
            closes.len() - 1 - gap.index,
            gap_fill_percent(&gap, current),
        ),
        None => (0.0, 0, 0.0),
    };

    let set = IndicatorSet {
        rsi: rsi(&closes, RSI_PERIOD),
        ma20,
        ma50,
        ma200,
        gap_percent,
        days_since_gap,
        gap_fill_percent: gap_fill,
        consolidation_percent: consolidation_percent(bars, CONSOLIDATION_WINDOW),
        volume_trend_percent: volume_trend_percent(&volumes),
        volume_spike_ratio: volume_spike_ratio(&volumes),
        trend_score: trend_score(bars, ma20, ma50, ma200),
        bars: bars.len(),
    };

    debug!(
        symbol = %symbol,
        rsi = format!("{:.1}", set.rsi),
        gap = format!("{:.1}%", set.gap_percent),
        days_since_gap = set.days_since_gap,
        range = format!("{:.1}%", set.consolidation_percent),
        trend = format!("{:.0}", set.trend_score),
        "Indicators computed"
    );

    Ok(set)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars_from(closes: &[f64], volume: u64) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 86_400, 0).unwrap(),
                open: c,
                high: c,
                low: c,
                close: c,
                volume,
            })
            .collect()
    }

    fn sym() -> Symbol {
        Symbol::parse("TEST").unwrap()
    }

    // -- RSI -------------------------------------------------------------

    #[test]
    fn test_rsi_short_series_is_neutral() {
        for len in 0..15 {
            let closes: Vec<f64> = (0..len).map(|i| 10.0 + (i as f64 * 1.7).sin()).collect();
            assert_eq!(rsi(&closes, RSI_PERIOD), 50.0, "len {len}");
        }
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
        assert_eq!(rsi(&closes, RSI_PERIOD), 100.0);
    }

    #[test]
    fn test_rsi_all_losses_is_0() {
        let closes: Vec<f64> = (0..20).map(|i| 40.0 - i as f64).collect();
        assert!(rsi(&closes, RSI_PERIOD).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_flat_is_neutral() {
        assert_eq!(rsi(&[5.0; 30], RSI_PERIOD), 50.0);
    }

    #[test]
    fn test_rsi_balanced_moves() {
        // Alternating +1/-1 over 14 changes -> equal gain and loss
        let closes: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        assert!((rsi(&closes, RSI_PERIOD) - 50.0).abs() < 1e-9);
    }

    // -- Moving averages -------------------------------------------------

    #[test]
    fn test_sma_basic() {
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
        assert_eq!(sma(&[1.0, 2.0], 3), None);
        assert_eq!(sma(&[1.0], 0), None);
    }

    #[test]
    fn test_moving_average_fallbacks() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let (ma20, ma50, ma200) = moving_averages(&closes);
        assert!((ma20 - 20.5).abs() < 1e-9);
        assert_eq!(ma50, ma20);
        assert_eq!(ma200, ma50);

        let short = [2.0, 4.0, 6.0];
        let (ma20, _, _) = moving_averages(&short);
        assert!((ma20 - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_moving_averages_full_history() {
        let closes: Vec<f64> = (1..=200).map(|i| i as f64).collect();
        let (ma20, ma50, ma200) = moving_averages(&closes);
        assert!((ma20 - 190.5).abs() < 1e-9);
        assert!((ma50 - 175.5).abs() < 1e-9);
        assert!((ma200 - 100.5).abs() < 1e-9);
    }

    // -- Gap -------------------------------------------------------------

    #[test]
    fn test_detect_gap_picks_most_negative() {
        let closes = [10.0, 9.5, 9.6, 8.0, 8.1];
        let gap = detect_gap(&closes).unwrap();
        assert_eq!(gap.index, 3);
        assert!((gap.percent - (8.0 - 9.6) / 9.6 * 100.0).abs() < 1e-9);
        assert_eq!(gap.prior_close, 9.6);
    }

    #[test]
    fn test_detect_gap_too_short() {
        assert!(detect_gap(&[]).is_none());
        assert!(detect_gap(&[3.0]).is_none());
    }

    #[test]
    fn test_gap_fill_bounds() {
        let gap = Gap { percent: -20.0, index: 1, close: 8.0, prior_close: 10.0 };
        assert_eq!(gap_fill_percent(&gap, 8.0), 0.0);
        assert!((gap_fill_percent(&gap, 9.0) - 50.0).abs() < 1e-9);
        assert_eq!(gap_fill_percent(&gap, 10.0), 100.0);
        // Far past either boundary
        assert_eq!(gap_fill_percent(&gap, 1.0), 0.0);
        assert_eq!(gap_fill_percent(&gap, 500.0), 100.0);
    }

    #[test]
    fn test_gap_fill_always_in_range() {
        let gap = Gap { percent: -7.0, index: 4, close: 9.3, prior_close: 10.0 };
        for i in -100..400 {
            let price = i as f64 * 0.1;
            let fill = gap_fill_percent(&gap, price);
            assert!((0.0..=100.0).contains(&fill), "price {price} -> {fill}");
        }
    }

    #[test]
    fn test_gap_fill_non_drop_is_zero() {
        let gap = Gap { percent: 3.0, index: 1, close: 10.3, prior_close: 10.0 };
        assert_eq!(gap_fill_percent(&gap, 11.0), 0.0);
    }

    // -- Consolidation / volume -----------------------------------------

    #[test]
    fn test_consolidation_uses_trailing_window() {
        let mut bars = bars_from(&[50.0, 10.0, 10.0, 10.0, 10.0, 10.0], 100);
        bars[5].high = 10.5;
        bars[3].low = 9.5;
        let pct = consolidation_percent(&bars, 5);
        assert!((pct - (10.5 - 9.5) / 9.5 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_volume_trend_and_spike() {
        let mut volumes = vec![100.0; 15];
        volumes.extend([200.0; 5]);
        assert!((volume_trend_percent(&volumes) - 100.0).abs() < 1e-9);
        // baseline: 15*100 + 5*200 over 20 = 125
        assert!((volume_spike_ratio(&volumes) - 200.0 / 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_volume_flat() {
        let volumes = vec![1_000.0; 30];
        assert_eq!(volume_trend_percent(&volumes), 0.0);
        assert!((volume_spike_ratio(&volumes) - 1.0).abs() < 1e-9);
    }

    // -- Trend score -----------------------------------------------------

    #[test]
    fn test_trend_score_uptrend_high() {
        let closes: Vec<f64> = (0..60).map(|i| 10.0 + i as f64 * 0.2).collect();
        let bars = bars_from(&closes, 1_000);
        let (ma20, ma50, ma200) = moving_averages(&closes);
        let score = trend_score(&bars, ma20, ma50, ma200);
        // +10 +10 +10 (bullish) +10 (momentum) +10 (higher highs)
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_trend_score_downtrend_clamped_low() {
        let closes: Vec<f64> = (0..220).map(|i| 100.0 - i as f64 * 0.4).collect();
        let bars = bars_from(&closes, 1_000);
        let (ma20, ma50, ma200) = moving_averages(&closes);
        let score = trend_score(&bars, ma20, ma50, ma200);
        // 50 -10 -10 -10 -10 -5 -10 = -5 -> clamped
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_trend_score_flat() {
        let bars = bars_from(&[10.0; 30], 1_000);
        let score = trend_score(&bars, 10.0, 10.0, 10.0);
        // -10 -10 +5 (near cross) +0 momentum -5 (no higher highs)
        assert_eq!(score, 30.0);
    }

    // -- Full computation ------------------------------------------------

    #[test]
    fn test_compute_requires_minimum_bars() {
        let bars = bars_from(&[10.0; 14], 1_000);
        match compute(&sym(), &bars) {
            Err(ScanError::InsufficientHistory { have, need, .. }) => {
                assert_eq!(have, 14);
                assert_eq!(need, 15);
            }
            other => panic!("expected InsufficientHistory, got {other:?}"),
        }
    }

    #[test]
    fn test_scenario_single_gap_then_flat() {
        let mut closes = vec![10.0; 10];
        closes.extend(vec![8.8; 20]); // -12% on bar 10
        let bars = bars_from(&closes, 1_000_000);

        let set = compute(&sym(), &bars).unwrap();
        assert!((set.gap_percent - (-12.0)).abs() < 1e-6);
        assert_eq!(set.days_since_gap, 30 - 1 - 10);
        assert!(set.gap_fill_percent.abs() < 1e-9);
        assert_eq!(set.rsi, 50.0);
        assert_eq!(set.volume_trend_percent, 0.0);
        assert!((set.volume_spike_ratio - 1.0).abs() < 1e-9);
        assert_eq!(set.bars, 30);
    }

    #[test]
    fn test_compute_partial_fill() {
        let mut closes = vec![10.0; 10];
        closes.push(8.0);
        closes.extend(vec![8.5; 9]);
        closes.push(9.0);
        let bars = bars_from(&closes, 1_000);
        let set = compute(&sym(), &bars).unwrap();
        assert!((set.gap_percent + 20.0).abs() < 1e-9);
        assert!((set.gap_fill_percent - 50.0).abs() < 1e-9);
        assert_eq!(set.days_since_gap, 10);
    }
}
