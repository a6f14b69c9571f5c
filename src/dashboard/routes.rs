//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use anyhow::Result;
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::report::RunSummary;
use crate::engine::ScanReport;
use crate::storage::ReportSink;
use crate::types::ScoredCandidate;

/// Run history kept in memory.
const MAX_RUNS: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub started_at: DateTime<Utc>,
    pub latest: RwLock<Option<ScanReport>>,
    pub runs: RwLock<Vec<RunSummary>>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            latest: RwLock::new(None),
            runs: RwLock::new(Vec::new()),
        }
    }

    /// Replace the latest report and append it to the run history.
    pub async fn record(&self, report: &ScanReport) {
        {
            let mut runs = self.runs.write().await;
            runs.push(RunSummary::from(report));
            let excess = runs.len().saturating_sub(MAX_RUNS);
            runs.drain(..excess);
        }
        *self.latest.write().await = Some(report.clone());
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

pub type AppState = Arc<DashboardState>;

/// Report sink feeding the dashboard.
pub struct DashboardSink {
    state: AppState,
}

impl DashboardSink {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ReportSink for DashboardSink {
    fn name(&self) -> &str {
        "dashboard"
    }

    async fn publish(&self, report: &ScanReport) -> Result<()> {
        self.state.record(report).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: i64,
    pub runs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageEntry {
    pub step: String,
    pub survivors: usize,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        runs: state.runs.read().await.len(),
    })
}

/// GET /api/report (404 until the first run finishes)
pub async fn get_report(State(state): State<AppState>) -> Result<Json<ScanReport>, StatusCode> {
    state
        .latest
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/candidates
pub async fn get_candidates(State(state): State<AppState>) -> Json<Vec<ScoredCandidate>> {
    let latest = state.latest.read().await;
    Json(latest.as_ref().map(|r| r.top().to_vec()).unwrap_or_default())
}

/// GET /api/stages
pub async fn get_stages(State(state): State<AppState>) -> Json<Vec<StageEntry>> {
    let latest = state.latest.read().await;
    let stages = latest
        .as_ref()
        .map(|r| {
            r.counts
                .funnel()
                .into_iter()
                .map(|(step, survivors)| StageEntry { step, survivors })
                .collect()
        })
        .unwrap_or_default();
    Json(stages)
}

/// GET /api/runs (most recent first)
pub async fn get_runs(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    let runs = state.runs.read().await;
    Json(runs.iter().rev().cloned().collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
