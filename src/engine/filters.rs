//! Filter cascade.
//!
//! A fixed, ordered list of inclusive-range predicates. A symbol is checked
//! stage by stage and dropped at the first failure; reference data is only
//! needed (and only looked up) for symbols that reach the last stage.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::FilterConfig;
use crate::types::{IndicatorSet, Quote, ReferenceData};

/// Cascade stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    Price,
    Gap,
    Consolidation,
    Rsi,
    Volume,
    Trend,
    ShortInterest,
}

impl FilterStage {
    /// All stages in the order they run.
    pub const ALL: [FilterStage; 7] = [
        FilterStage::Price,
        FilterStage::Gap,
        FilterStage::Consolidation,
        FilterStage::Rsi,
        FilterStage::Volume,
        FilterStage::Trend,
        FilterStage::ShortInterest,
    ];

    /// Position in the cascade (0-based).
    pub fn index(self) -> usize {
        FilterStage::ALL
            .iter()
            .position(|s| *s == self)
            .unwrap_or(FilterStage::ALL.len())
    }

    /// Whether the stage reads short interest / float.
    pub fn needs_reference(self) -> bool {
        matches!(self, FilterStage::ShortInterest)
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FilterStage::Price => "price",
            FilterStage::Gap => "gap",
            FilterStage::Consolidation => "consolidation",
            FilterStage::Rsi => "rsi",
            FilterStage::Volume => "volume",
            FilterStage::Trend => "trend",
            FilterStage::ShortInterest => "short_interest",
        };
        f.write_str(label)
    }
}

/// Why a symbol failed a stage: the observed value and the bound it missed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRejection {
    pub stage: FilterStage,
    pub observed: f64,
    pub limit: String,
}

impl fmt::Display for StageRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2} outside {}", self.stage, self.observed, self.limit)
    }
}

/// The values a stage is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub quote: &'a Quote,
    pub indicators: &'a IndicatorSet,
    /// Attached once the symbol reaches a stage that needs it.
    pub reference: Option<&'a ReferenceData>,
}

pub struct FilterCascade {
    config: FilterConfig,
}

impl FilterCascade {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Evaluate one stage.
    pub fn check(&self, stage: FilterStage, subject: &Subject<'_>) -> Result<(), StageRejection> {
        let c = &self.config;
        let ind = subject.indicators;
        let reject = |observed: f64, limit: String| StageRejection { stage, observed, limit };

        match stage {
            FilterStage::Price => {
                let price = subject.quote.price;
                if price > 0.0 && price <= c.max_price {
                    Ok(())
                } else {
                    Err(reject(price, format!("(0, {}]", c.max_price)))
                }
            }
            FilterStage::Gap => {
                let gap = ind.gap_percent;
                if gap >= c.gap_min_percent && gap <= c.gap_max_percent {
                    Ok(())
                } else {
                    Err(reject(gap, format!("[{}, {}]", c.gap_min_percent, c.gap_max_percent)))
                }
            }
            FilterStage::Consolidation => {
                let range = ind.consolidation_percent;
                if range >= c.consolidation_min_percent && range <= c.consolidation_max_percent {
                    Ok(())
                } else {
                    Err(reject(
                        range,
                        format!("[{}, {}]", c.consolidation_min_percent, c.consolidation_max_percent),
                    ))
                }
            }
            FilterStage::Rsi => {
                if ind.rsi <= c.max_rsi {
                    Ok(())
                } else {
                    Err(reject(ind.rsi, format!("<= {}", c.max_rsi)))
                }
            }
            FilterStage::Volume => {
                let volume = subject.quote.screening_volume();
                if volume >= c.min_volume {
                    Ok(())
                } else {
                    Err(reject(volume as f64, format!(">= {}", c.min_volume)))
                }
            }
            FilterStage::Trend => {
                if ind.trend_score >= c.min_trend_score {
                    Ok(())
                } else {
                    Err(reject(ind.trend_score, format!(">= {}", c.min_trend_score)))
                }
            }
            FilterStage::ShortInterest => {
                let Some(reference) = subject.reference else {
                    return Err(reject(0.0, "reference data attached".into()));
                };
                if reference.short_interest_percent < c.min_short_interest {
                    return Err(reject(
                        reference.short_interest_percent,
                        format!("short interest >= {}", c.min_short_interest),
                    ));
                }
                if reference.float_shares > c.max_float_shares {
                    return Err(reject(
                        reference.float_shares as f64,
                        format!("float <= {}", c.max_float_shares),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Evaluate every stage in order, stopping at the first failure.
    pub fn screen(&self, subject: &Subject<'_>) -> Result<(), StageRejection> {
        FilterStage::ALL
            .iter()
            .try_for_each(|stage| self.check(*stage, subject))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
