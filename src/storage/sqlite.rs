//! SQLite run history.
//!
//! Two tables: `scan_runs` (one row per run, parameters and counts stored
//! as JSON) and `scan_candidates` (one row per ranked candidate).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::ReportSink;
use crate::engine::report::RunSummary;
use crate::engine::ScanReport;
use crate::types::{ScanError, Symbol};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scan_runs (
        run_id TEXT PRIMARY KEY,
        scanner TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        universe INTEGER NOT NULL,
        candidates INTEGER NOT NULL,
        top_symbol TEXT,
        top_score REAL,
        parameters TEXT NOT NULL,
        counts TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scan_candidates (
        run_id TEXT NOT NULL REFERENCES scan_runs(run_id),
        rank INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        score REAL NOT NULL,
        price REAL NOT NULL,
        gap_percent REAL NOT NULL,
        rsi REAL NOT NULL,
        short_interest REAL NOT NULL,
        source TEXT NOT NULL,
        breakdown TEXT NOT NULL,
        plays TEXT NOT NULL,
        PRIMARY KEY (run_id, rank)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_scan_runs_started ON scan_runs(started_at DESC)",
];

fn storage(err: sqlx::Error) -> ScanError {
    ScanError::Storage(err.to_string())
}

/// One stored candidate row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCandidate {
    pub rank: i64,
    pub symbol: String,
    pub score: f64,
    pub price: f64,
}

pub struct SqliteReportSink {
    pool: SqlitePool,
}

impl SqliteReportSink {
    /// Open (creating if needed) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(storage)
            .with_context(|| format!("Failed to open SQLite database: {url}"))?;

        let sink = Self { pool };
        sink.migrate().await?;
        info!(url, "SQLite report sink ready");
        Ok(sink)
    }

    /// Single-connection in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;
        let sink = Self { pool };
        sink.migrate().await?;
        Ok(sink)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage)
                .context("Failed to apply SQLite schema")?;
        }
        Ok(())
    }

    /// Persist one report in a single transaction.
    pub async fn save(&self, report: &ScanReport) -> Result<()> {
        let summary = RunSummary::from(report);
        let parameters = serde_json::to_string(&report.parameters)?;
        let counts = serde_json::to_string(&report.counts)?;

        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query(
            r#"
            INSERT INTO scan_runs (
                run_id, scanner, started_at, finished_at, universe, candidates,
                top_symbol, top_score, parameters, counts
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(summary.run_id.to_string())
        .bind(&summary.scanner)
        .bind(summary.started_at.to_rfc3339())
        .bind(summary.finished_at.to_rfc3339())
        .bind(summary.universe as i64)
        .bind(summary.candidates as i64)
        .bind(summary.top_symbol.as_ref().map(|s| s.to_string()))
        .bind(summary.top_score)
        .bind(parameters)
        .bind(counts)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        for (rank, scored) in report.candidates.iter().enumerate() {
            let c = &scored.candidate;
            sqlx::query(
                r#"
                INSERT INTO scan_candidates (
                    run_id, rank, symbol, score, price, gap_percent, rsi,
                    short_interest, source, breakdown, plays
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(summary.run_id.to_string())
            .bind(rank as i64 + 1)
            .bind(c.symbol.as_str())
            .bind(scored.score)
            .bind(c.quote.price)
            .bind(c.indicators.gap_percent)
            .bind(c.indicators.rsi)
            .bind(c.reference.short_interest_percent)
            .bind(&c.source)
            .bind(serde_json::to_string(&scored.breakdown)?)
            .bind(serde_json::to_string(&scored.plays)?)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, scanner, started_at, finished_at, universe, candidates,
                   top_symbol, top_score
            FROM scan_runs
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter()
            .map(|row| {
                let run_id: String = row.get("run_id");
                let started_at: String = row.get("started_at");
                let finished_at: String = row.get("finished_at");
                let top_symbol: Option<String> = row.get("top_symbol");
                Ok(RunSummary {
                    run_id: Uuid::parse_str(&run_id).context("Bad run_id in scan_runs")?,
                    scanner: row.get("scanner"),
                    started_at: parse_time(&started_at)?,
                    finished_at: parse_time(&finished_at)?,
                    universe: row.get::<i64, _>("universe") as usize,
                    candidates: row.get::<i64, _>("candidates") as usize,
                    top_symbol: top_symbol.as_deref().and_then(Symbol::parse),
                    top_score: row.get("top_score"),
                })
            })
            .collect()
    }

    /// Ranked candidates of one run.
    pub async fn candidates_for(&self, run_id: Uuid) -> Result<Vec<StoredCandidate>> {
        let rows = sqlx::query(
            "SELECT rank, symbol, score, price FROM scan_candidates WHERE run_id = ? ORDER BY rank",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows
            .into_iter()
            .map(|row| StoredCandidate {
                rank: row.get("rank"),
                symbol: row.get("symbol"),
                score: row.get("score"),
                price: row.get("price"),
            })
            .collect())
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Bad timestamp in scan_runs: {raw}"))?
        .with_timezone(&Utc))
}

#[async_trait]
impl ReportSink for SqliteReportSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn publish(&self, report: &ScanReport) -> Result<()> {
        self.save(report).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
