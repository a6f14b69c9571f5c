//! Synthetic near-the-money option plays.
//!
//! No option chain is fetched. Strikes are rounded multiples of the
//! current price and premiums come from a fixed intrinsic + time-value
//! approximation, clamped into the configured band.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

use crate::config::OptionsConfig;
use crate::types::{OptionPlay, OptionType};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Price multipliers for candidate strikes, ATM first.
const STRIKE_MULTIPLIERS: [f64; 5] = [1.0, 0.90, 0.95, 1.05, 1.10];

/// Flat time value added to every premium.
const BASE_TIME_VALUE: Decimal = dec!(0.03);

/// Extra time value per unit of OTM fraction.
const OTM_TIME_VALUE: Decimal = dec!(0.05);

/// Premiums are carried to this many decimal places.
const PREMIUM_DP: u32 = 4;

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

pub struct OptionsEstimator {
    config: OptionsConfig,
}

impl OptionsEstimator {
    pub fn new(config: OptionsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptionsConfig {
        &self.config
    }

    /// Deduplicated whole-dollar strikes inside `(0, max_strike)`.
    fn strikes(&self, price: f64) -> Vec<Decimal> {
        let mut strikes: Vec<Decimal> = Vec::with_capacity(STRIKE_MULTIPLIERS.len());
        for m in STRIKE_MULTIPLIERS {
            let Some(strike) = Decimal::from_f64((price * m).round()) else {
                continue;
            };
            if strike <= Decimal::ZERO || strike >= self.config.max_strike {
                continue;
            }
            if !strikes.contains(&strike) {
                strikes.push(strike);
            }
        }
        strikes
    }

    /// Premium estimate for one strike, clamped into the band.
    pub fn premium(&self, price: Decimal, strike: Decimal, otm_percent: f64) -> Decimal {
        let intrinsic = (price - strike).abs();
        let otm_fraction = Decimal::from_f64(otm_percent / 100.0).unwrap_or_default();
        let raw = intrinsic + BASE_TIME_VALUE + OTM_TIME_VALUE * otm_fraction;
        raw.round_dp(PREMIUM_DP)
            .clamp(self.config.min_premium, self.config.max_premium)
    }

    /// Up to `max_plays` plays for a current price, nearest to the money first.
    pub fn estimate(&self, price: f64) -> Vec<OptionPlay> {
        if !price.is_finite() || price <= 0.0 {
            return Vec::new();
        }
        let Some(spot) = Decimal::from_f64(price) else {
            return Vec::new();
        };

        let mut plays: Vec<OptionPlay> = self
            .strikes(price)
            .into_iter()
            .filter_map(|strike| {
                let strike_f = strike.to_f64()?;
                let otm_percent = (strike_f - price).abs() / price * 100.0;
                if otm_percent > self.config.max_otm_percent {
                    return None;
                }
                let option_type = if strike >= spot {
                    OptionType::Call
                } else {
                    OptionType::Put
                };
                Some(OptionPlay {
                    option_type,
                    strike,
                    premium: self.premium(spot, strike, otm_percent),
                    otm_percent,
                })
            })
            .collect();

        // Stable: equidistant strikes keep multiplier order.
        plays.sort_by(|a, b| {
            a.otm_percent
                .partial_cmp(&b.otm_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        plays.truncate(self.config.max_plays);
        plays
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
