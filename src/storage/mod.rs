//! Report persistence.
//!
//! Every finished scan is handed to a list of `ReportSink`s. The JSON sink
//! writes the whole report to one file (overwritten each run, reloadable);
//! the SQLite sink keeps run history. A failing sink is logged and skipped.

pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::engine::ScanReport;

/// Default report file path.
const DEFAULT_REPORT_FILE: &str = "gapscan_report.json";

/// Destination for finished scan reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Sink name for logging.
    fn name(&self) -> &str;

    async fn publish(&self, report: &ScanReport) -> Result<()>;
}

/// Publish to every sink. Returns how many sinks accepted the report.
pub async fn publish_all(sinks: &[Box<dyn ReportSink>], report: &ScanReport) -> usize {
    let mut accepted = 0;
    for sink in sinks {
        match sink.publish(report).await {
            Ok(()) => {
                debug!(sink = sink.name(), run_id = %report.run_id, "Report published");
                accepted += 1;
            }
            Err(e) => warn!(sink = sink.name(), error = %e, "Report sink failed"),
        }
    }
    accepted
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// Save a report as pretty JSON.
pub fn save_report(report: &ScanReport, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);
    let json = serde_json::to_string_pretty(report).context("Failed to serialise scan report")?;

    std::fs::write(path, &json).context(format!("Failed to write report to {path}"))?;

    debug!(path, candidates = report.candidates.len(), "Report saved");
    Ok(())
}

/// Load a previously saved report. Returns None if the file doesn't exist.
pub fn load_report(path: Option<&str>) -> Result<Option<ScanReport>> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved report found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read report from {path}"))?;

    let report: ScanReport =
        serde_json::from_str(&json).context(format!("Failed to parse report from {path}"))?;

    info!(
        path,
        run_id = %report.run_id,
        candidates = report.candidates.len(),
        "Report loaded from disk"
    );

    Ok(Some(report))
}

/// Delete the report file, if any.
pub fn delete_report(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete report file {path}"))?;
    }
    Ok(())
}

/// Writes each report to a fixed JSON file.
pub struct JsonReportSink {
    path: String,
}

impl JsonReportSink {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReportSink for JsonReportSink {
    fn name(&self) -> &str {
        "json"
    }

    async fn publish(&self, report: &ScanReport) -> Result<()> {
        save_report(report, Some(&self.path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
