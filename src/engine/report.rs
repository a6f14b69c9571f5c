//! Scan report: ranked candidates, rejection ledger and survivor counts.
//!
//! One `ScanReport` is produced per run and handed to every report sink.
//! It carries the parameters of the run so any filter or score decision can
//! be reproduced from the report alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::filters::{FilterStage, StageRejection};
use crate::config::{FilterConfig, OptionsConfig};
use crate::types::{ScoredCandidate, Symbol};

// ---------------------------------------------------------------------------
// Survivor counts
// ---------------------------------------------------------------------------

/// Survivors of one filter stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCount {
    pub stage: FilterStage,
    pub survivors: usize,
}

/// How many symbols made it past each step of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCounts {
    pub universe: usize,
    /// Quote and history both fetched
    pub fetched: usize,
    /// Enough bars for indicators
    pub with_history: usize,
    /// One entry per filter stage, in cascade order
    pub stages: Vec<StageCount>,
    pub scored: usize,
    /// Scored at or above the final score floor
    pub above_floor: usize,
}

impl StageCounts {
    pub fn new(universe: usize) -> Self {
        Self {
            universe,
            fetched: 0,
            with_history: 0,
            stages: FilterStage::ALL
                .iter()
                .map(|stage| StageCount { stage: *stage, survivors: 0 })
                .collect(),
            scored: 0,
            above_floor: 0,
        }
    }

    pub fn record_pass(&mut self, stage: FilterStage) {
        if let Some(count) = self.stages.get_mut(stage.index()) {
            count.survivors += 1;
        }
    }

    pub fn survivors(&self, stage: FilterStage) -> usize {
        self.stages
            .get(stage.index())
            .map(|c| c.survivors)
            .unwrap_or(0)
    }

    /// Every step of the run in order, as `(label, survivors)`.
    pub fn funnel(&self) -> Vec<(String, usize)> {
        let mut steps = vec![
            ("universe".to_string(), self.universe),
            ("fetched".to_string(), self.fetched),
            ("history".to_string(), self.with_history),
        ];
        steps.extend(self.stages.iter().map(|c| (c.stage.to_string(), c.survivors)));
        steps.push(("scored".to_string(), self.scored));
        steps.push(("above_floor".to_string(), self.above_floor));
        steps
    }

    /// True when no step has more survivors than the one before it.
    pub fn is_monotonic(&self) -> bool {
        self.funnel().windows(2).all(|w| w[0].1 >= w[1].1)
    }
}

impl fmt::Display for StageCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self
            .funnel()
            .iter()
            .map(|(label, n)| format!("{label}={n}"))
            .collect();
        f.write_str(&steps.join(" → "))
    }
}

// ---------------------------------------------------------------------------
// Rejection ledger
// ---------------------------------------------------------------------------

/// Why a symbol did not make the candidate list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    ProviderUnavailable { detail: String },
    InsufficientHistory { have: usize, need: usize },
    Filtered(StageRejection),
    BelowScoreFloor { score: f64, floor: f64 },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::ProviderUnavailable { detail } => write!(f, "provider unavailable: {detail}"),
            RejectionReason::InsufficientHistory { have, need } => {
                write!(f, "insufficient history: {have}/{need} bars")
            }
            RejectionReason::Filtered(r) => write!(f, "filtered: {r}"),
            RejectionReason::BelowScoreFloor { score, floor } => {
                write!(f, "score {score:.0} below floor {floor:.0}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub symbol: Symbol,
    #[serde(flatten)]
    pub reason: RejectionReason,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// The knobs a run was executed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanParameters {
    pub lookback_days: u32,
    pub request_delay_ms: u64,
    pub top_n: usize,
    pub sources: Vec<String>,
    pub filters: FilterConfig,
    pub options: OptionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub run_id: Uuid,
    pub scanner: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub parameters: ScanParameters,
    pub counts: StageCounts,
    /// Every scored candidate at or above the floor, best first
    pub candidates: Vec<ScoredCandidate>,
    pub rejections: Vec<Rejection>,
}

impl ScanReport {
    /// The first `top_n` candidates.
    pub fn top(&self) -> &[ScoredCandidate] {
        let n = self.parameters.top_n.min(self.candidates.len());
        &self.candidates[..n]
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Rejections at a given filter stage.
    pub fn rejected_at(&self, stage: FilterStage) -> impl Iterator<Item = &Rejection> {
        self.rejections.iter().filter(move |r| {
            matches!(&r.reason, RejectionReason::Filtered(s) if s.stage == stage)
        })
    }
}

/// One line of run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub scanner: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub universe: usize,
    pub candidates: usize,
    pub top_symbol: Option<Symbol>,
    pub top_score: Option<f64>,
}

impl From<&ScanReport> for RunSummary {
    fn from(report: &ScanReport) -> Self {
        let best = report.candidates.first();
        Self {
            run_id: report.run_id,
            scanner: report.scanner.clone(),
            started_at: report.started_at,
            finished_at: report.finished_at,
            universe: report.counts.universe,
            candidates: report.candidates.len(),
            top_symbol: best.map(|c| c.symbol().clone()),
            top_score: best.map(|c| c.score),
        }
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} run {} ({:.1}s): {}",
            self.scanner,
            self.run_id,
            self.duration_secs(),
            self.counts,
        )?;
        if self.candidates.is_empty() {
            return writeln!(f, "  no candidates");
        }
        for (rank, candidate) in self.top().iter().enumerate() {
            writeln!(f, "  #{} {}", rank + 1, candidate)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
