//! Scan orchestrator.
//!
//! Walks the universe one symbol at a time: fetch quote and history,
//! compute indicators, run the filter cascade, attach reference data,
//! score, estimate option plays. Any per-symbol failure lands in the
//! rejection ledger and the run moves on; a run always produces a report.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::filters::{FilterCascade, FilterStage, Subject};
use super::options::OptionsEstimator;
use super::report::{Rejection, RejectionReason, ScanParameters, ScanReport, StageCounts};
use super::scorer::Scorer;
use crate::config::AppConfig;
use crate::indicators;
use crate::providers::router::ProviderRouter;
use crate::reference::ReferenceSource;
use crate::types::{Candidate, ScanError, ScoredCandidate, Symbol};
use crate::universe::Universe;

/// Run-level knobs that are not filter or options thresholds.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub name: String,
    pub lookback_days: u32,
    /// Fixed pause after every symbol; the only rate control.
    pub request_delay: Duration,
    pub top_n: usize,
}

pub struct Scanner {
    router: ProviderRouter,
    reference: Arc<dyn ReferenceSource>,
    cascade: FilterCascade,
    estimator: OptionsEstimator,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(
        router: ProviderRouter,
        reference: Arc<dyn ReferenceSource>,
        cascade: FilterCascade,
        estimator: OptionsEstimator,
        settings: ScanSettings,
    ) -> Self {
        Self {
            router,
            reference,
            cascade,
            estimator,
            settings,
        }
    }

    /// Build a scanner from configuration plus already-built collaborators.
    pub fn from_config(
        config: &AppConfig,
        router: ProviderRouter,
        reference: Arc<dyn ReferenceSource>,
    ) -> Self {
        let settings = ScanSettings {
            name: config.scanner.name.clone(),
            lookback_days: config.scanner.lookback_days,
            request_delay: Duration::from_millis(config.scanner.request_delay_ms),
            top_n: config.scanner.top_n,
        };
        Self::new(
            router,
            reference,
            FilterCascade::new(config.filters.clone()),
            OptionsEstimator::new(config.options.clone()),
            settings,
        )
    }

    fn parameters(&self) -> ScanParameters {
        ScanParameters {
            lookback_days: self.settings.lookback_days,
            request_delay_ms: self.settings.request_delay.as_millis() as u64,
            top_n: self.settings.top_n,
            sources: self
                .router
                .source_names()
                .into_iter()
                .map(String::from)
                .collect(),
            filters: self.cascade.config().clone(),
            options: self.estimator.config().clone(),
        }
    }

    /// Scan every symbol in the universe, in order.
    pub async fn run(&self, universe: &Universe) -> ScanReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            run_id = %run_id,
            scanner = %self.settings.name,
            symbols = universe.len(),
            sources = ?self.router.source_names(),
            reference = self.reference.name(),
            "Starting scan"
        );

        let mut counts = StageCounts::new(universe.len());
        let mut candidates: Vec<ScoredCandidate> = Vec::new();
        let mut rejections: Vec<Rejection> = Vec::new();

        for symbol in universe.iter() {
            match self.scan_symbol(symbol, &mut counts).await {
                Ok(scored) => {
                    debug!(symbol = %symbol, score = scored.score, "Candidate accepted");
                    candidates.push(scored);
                }
                Err(reason) => {
                    debug!(symbol = %symbol, reason = %reason, "Symbol rejected");
                    rejections.push(Rejection {
                        symbol: symbol.clone(),
                        reason,
                    });
                }
            }

            if !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }
        }

        // Stable: equal scores keep universe order.
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let report = ScanReport {
            run_id,
            scanner: self.settings.name.clone(),
            started_at,
            finished_at: Utc::now(),
            parameters: self.parameters(),
            counts,
            candidates,
            rejections,
        };

        info!(
            run_id = %report.run_id,
            funnel = %report.counts,
            candidates = report.candidates.len(),
            rejected = report.rejections.len(),
            top = report.top().first().map(|c| c.symbol().to_string()).unwrap_or_default(),
            elapsed = format!("{:.1}s", report.duration_secs()),
            "Scan complete"
        );

        report
    }

    /// Take one symbol through the whole pipeline.
    async fn scan_symbol(
        &self,
        symbol: &Symbol,
        counts: &mut StageCounts,
    ) -> Result<ScoredCandidate, RejectionReason> {
        let snapshot = match self.router.fetch(symbol, self.settings.lookback_days).await {
            Ok(s) => s,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Dropping symbol");
                return Err(RejectionReason::ProviderUnavailable { detail: e.to_string() });
            }
        };
        counts.fetched += 1;

        let indicators = indicators::compute(symbol, &snapshot.bars).map_err(|e| match e {
            ScanError::InsufficientHistory { have, need, .. } => {
                RejectionReason::InsufficientHistory { have, need }
            }
            other => RejectionReason::ProviderUnavailable { detail: other.to_string() },
        })?;
        counts.with_history += 1;

        // Reference data is only looked up for symbols that reach a stage
        // needing it.
        let mut reference = None;
        for stage in FilterStage::ALL {
            if stage.needs_reference() && reference.is_none() {
                reference = Some(self.reference.lookup(symbol));
            }
            let subject = Subject {
                quote: &snapshot.quote,
                indicators: &indicators,
                reference: reference.as_ref(),
            };
            self.cascade
                .check(stage, &subject)
                .map_err(RejectionReason::Filtered)?;
            counts.record_pass(stage);
        }

        let reference = reference.unwrap_or_else(|| self.reference.lookup(symbol));
        let source = if snapshot.quote_source == snapshot.history_source {
            snapshot.quote_source.to_string()
        } else {
            format!("{}+{}", snapshot.quote_source, snapshot.history_source)
        };

        let candidate = Candidate {
            symbol: symbol.clone(),
            quote: snapshot.quote,
            indicators,
            reference,
            source,
        };

        let (score, breakdown) = Scorer::score(&candidate);
        let plays = self.estimator.estimate(candidate.quote.price);
        counts.scored += 1;

        let floor = self.cascade.config().min_score;
        if score < floor {
            return Err(RejectionReason::BelowScoreFloor { score, floor });
        }
        counts.above_floor += 1;

        info!(
            symbol = %symbol,
            score = format!("{score:.0}"),
            price = format!("${:.2}", candidate.quote.price),
            change = candidate
                .quote
                .change_percent()
                .map(|c| format!("{c:+.1}%"))
                .unwrap_or_default(),
            plays = plays.len(),
            source = %candidate.source,
            "Candidate found"
        );

        Ok(ScoredCandidate {
            candidate,
            score,
            breakdown,
            plays,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
