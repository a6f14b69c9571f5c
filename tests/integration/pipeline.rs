//! End-to-end scans against in-memory sources.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gapscan::config::{FilterConfig, OptionsConfig};
use gapscan::engine::filters::{FilterCascade, FilterStage};
use gapscan::engine::options::OptionsEstimator;
use gapscan::engine::report::RejectionReason;
use gapscan::engine::scanner::{ScanSettings, Scanner};
use gapscan::engine::ScanReport;
use gapscan::providers::router::ProviderRouter;
use gapscan::providers::MarketDataSource;
use gapscan::reference::{ReferenceSource, StaticReferenceTable};
use gapscan::storage::{self, sqlite::SqliteReportSink, JsonReportSink, ReportSink};
use gapscan::types::{ProviderError, ReferenceData, Symbol};
use gapscan::universe::Universe;

use crate::mock_source::{crash_history, setup_history, short_history, MockSource};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reference table that records which symbols were looked up.
struct RecordingReference {
    table: StaticReferenceTable,
    lookups: Mutex<Vec<Symbol>>,
}

impl RecordingReference {
    fn new(table: StaticReferenceTable) -> Self {
        Self {
            table,
            lookups: Mutex::new(Vec::new()),
        }
    }

    fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().iter().map(|s| s.to_string()).collect()
    }
}

impl ReferenceSource for RecordingReference {
    fn lookup(&self, symbol: &Symbol) -> ReferenceData {
        self.lookups.lock().unwrap().push(symbol.clone());
        self.table.lookup(symbol)
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn reference_table() -> StaticReferenceTable {
    StaticReferenceTable::new(0.0, 1_000_000_000)
        .with_entry("HIGH", 25.0, 40_000_000)
        .with_entry("MID", 12.0, 60_000_000)
        .with_entry("LOW", 6.0, 80_000_000)
        .with_entry("TWIN", 12.0, 60_000_000)
        .with_entry("KNIFE", 30.0, 20_000_000)
        .with_entry("PRICEY", 30.0, 20_000_000)
        .with_entry("THIN", 30.0, 20_000_000)
}

fn scanner_with(
    sources: Vec<Arc<dyn MarketDataSource>>,
    reference: Arc<dyn ReferenceSource>,
    delay: Duration,
    top_n: usize,
) -> Scanner {
    Scanner::new(
        ProviderRouter::new(sources),
        reference,
        FilterCascade::new(FilterConfig::default()),
        OptionsEstimator::new(OptionsConfig::default()),
        ScanSettings {
            name: "integration".into(),
            lookback_days: 60,
            request_delay: delay,
            top_n,
        },
    )
}

/// A mixed universe: three setups, one tie, and one failure of each kind.
fn market() -> MockSource {
    MockSource::new("mock")
        .with_history("HIGH", setup_history(10.0, 3.0))
        .with_history("MID", setup_history(8.0, 1.0))
        .with_history("LOW", setup_history(6.0, 1.0))
        .with_history("TWIN", setup_history(8.0, 1.0))
        .with_history("KNIFE", crash_history(10.0))
        .with_history("PRICEY", setup_history(30.0, 1.0))
        .with_history("THIN", short_history(5.0, 10))
        .with_history("NOSHORT", setup_history(7.0, 1.0))
}

const MARKET_UNIVERSE: [&str; 9] = [
    "LOW", "MID", "KNIFE", "HIGH", "PRICEY", "THIN", "GHOST", "TWIN", "NOSHORT",
];

async fn run_market(delay: Duration, top_n: usize) -> (ScanReport, Arc<RecordingReference>) {
    let reference = Arc::new(RecordingReference::new(reference_table()));
    let source: Arc<dyn MarketDataSource> = Arc::new(market());
    let scanner = scanner_with(vec![source], reference.clone(), delay, top_n);
    let report = scanner.run(&Universe::new(MARKET_UNIVERSE)).await;
    (report, reference)
}

fn symbols(report: &ScanReport) -> Vec<&str> {
    report.candidates.iter().map(|c| c.symbol().as_str()).collect()
}

fn reason_for<'a>(report: &'a ScanReport, symbol: &str) -> &'a RejectionReason {
    &report
        .rejections
        .iter()
        .find(|r| r.symbol.as_str() == symbol)
        .unwrap_or_else(|| panic!("{symbol} not rejected"))
        .reason
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_run_ranks_setups() {
    let (report, _) = run_market(Duration::ZERO, 10).await;

    // Score descending; MID and TWIN tie and keep universe order.
    assert_eq!(symbols(&report), vec!["HIGH", "MID", "TWIN", "LOW"]);
    assert!(report
        .candidates
        .windows(2)
        .all(|w| w[0].score >= w[1].score));
    assert_eq!(report.candidates[1].score, report.candidates[2].score);

    for c in &report.candidates {
        assert!((0.0..=100.0).contains(&c.score));
        assert!((c.breakdown.total().min(100.0) - c.score).abs() < 1e-9);
        assert!(!c.plays.is_empty() && c.plays.len() <= 3);
        assert_eq!(c.candidate.source, "mock");
        // Volume backfilled from history for a price-only quote
        assert!(c.candidate.quote.average_volume >= 1_000_000);
    }
}

#[tokio::test]
async fn test_full_run_rejection_ledger() {
    let (report, _) = run_market(Duration::ZERO, 10).await;

    assert_eq!(report.rejections.len(), 5);
    assert!(matches!(
        reason_for(&report, "GHOST"),
        RejectionReason::ProviderUnavailable { .. }
    ));
    assert_eq!(
        reason_for(&report, "THIN"),
        &RejectionReason::InsufficientHistory { have: 10, need: 15 }
    );
    match reason_for(&report, "KNIFE") {
        RejectionReason::Filtered(r) => assert_eq!(r.stage, FilterStage::Gap),
        other => panic!("unexpected: {other}"),
    }
    match reason_for(&report, "PRICEY") {
        RejectionReason::Filtered(r) => assert_eq!(r.stage, FilterStage::Price),
        other => panic!("unexpected: {other}"),
    }
}

#[tokio::test]
async fn test_stage_counts_monotonic() {
    let (report, _) = run_market(Duration::ZERO, 10).await;
    let counts = &report.counts;

    assert!(counts.is_monotonic(), "{counts}");
    assert_eq!(counts.universe, 9);
    assert_eq!(counts.fetched, 8);
    assert_eq!(counts.with_history, 7);
    assert_eq!(counts.survivors(FilterStage::Price), 6);
    assert_eq!(counts.survivors(FilterStage::Gap), 5);
    assert_eq!(counts.survivors(FilterStage::Trend), 5);
    assert_eq!(counts.survivors(FilterStage::ShortInterest), 4);
    assert_eq!(counts.scored, 4);
    assert_eq!(counts.above_floor, 4);

    // Nothing rejected at a stage shows up later
    for rejection in report.rejected_at(FilterStage::Gap) {
        assert!(!report.candidates.iter().any(|c| c.symbol() == &rejection.symbol));
    }
}

#[tokio::test]
async fn test_reference_only_for_technical_survivors() {
    let (_, reference) = run_market(Duration::ZERO, 10).await;
    assert_eq!(reference.lookups(), vec!["LOW", "MID", "HIGH", "TWIN", "NOSHORT"]);
}

#[tokio::test]
async fn test_top_n_limits_view_not_list() {
    let (report, _) = run_market(Duration::ZERO, 2).await;
    assert_eq!(report.top().len(), 2);
    assert_eq!(report.candidates.len(), 4);
    assert_eq!(report.top()[0].symbol().as_str(), "HIGH");
}

#[tokio::test]
async fn test_delay_does_not_change_results() {
    let start = Instant::now();
    let (slow, _) = run_market(Duration::from_millis(5), 10).await;
    assert!(start.elapsed() >= Duration::from_millis(5 * MARKET_UNIVERSE.len() as u64));

    let (fast, _) = run_market(Duration::ZERO, 10).await;
    assert_eq!(symbols(&slow), symbols(&fast));
    assert_eq!(slow.counts, fast.counts);
    let scores = |r: &ScanReport| r.candidates.iter().map(|c| c.score).collect::<Vec<_>>();
    assert_eq!(scores(&slow), scores(&fast));
}

#[tokio::test]
async fn test_empty_result_is_valid() {
    let reference = Arc::new(StaticReferenceTable::new(0.0, 1_000_000_000));
    let source: Arc<dyn MarketDataSource> =
        Arc::new(MockSource::new("mock").with_history("ONE", short_history(3.0, 5)));
    let report = scanner_with(vec![source], reference, Duration::ZERO, 10)
        .run(&Universe::new(["ONE", "TWO"]))
        .await;

    assert!(report.candidates.is_empty());
    assert!(report.top().is_empty());
    assert_eq!(report.rejections.len(), 2);
    assert!(report.to_string().contains("no candidates"));
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_duplicate_symbol_scanned_once() {
    let mock = Arc::new(MockSource::new("mock").with_history("HIGH", setup_history(10.0, 3.0)));
    let source: Arc<dyn MarketDataSource> = mock.clone();
    let reference = Arc::new(reference_table());

    let report = scanner_with(vec![source], reference, Duration::ZERO, 10)
        .run(&Universe::new(["HIGH", "high", " HIGH "]))
        .await;

    assert_eq!(report.counts.universe, 1);
    assert_eq!(symbols(&report), vec!["HIGH"]);
    assert_eq!(mock.requests().len(), 2); // one quote, one history
}

#[tokio::test]
async fn test_primary_failure_served_by_fallback() {
    let primary = Arc::new(MockSource::new("primary"));
    primary.set_error(ProviderError::Status {
        status: 503,
        body: "unavailable".into(),
    });
    let fallback = Arc::new(MockSource::new("fallback").with_history("HIGH", setup_history(10.0, 3.0)));

    let sources: Vec<Arc<dyn MarketDataSource>> = vec![primary.clone(), fallback.clone()];
    let report = scanner_with(sources, Arc::new(reference_table()), Duration::ZERO, 10)
        .run(&Universe::new(["HIGH"]))
        .await;

    assert_eq!(symbols(&report), vec!["HIGH"]);
    assert_eq!(report.candidates[0].candidate.source, "fallback");
    assert_eq!(primary.requests().len(), 2);
    assert_eq!(fallback.requests().len(), 2);
    assert_eq!(report.parameters.sources, vec!["primary", "fallback"]);
}

#[tokio::test]
async fn test_missing_short_interest_rejected_at_last_stage() {
    let (report, _) = run_market(Duration::ZERO, 10).await;

    match reason_for(&report, "NOSHORT") {
        RejectionReason::Filtered(r) => {
            assert_eq!(r.stage, FilterStage::ShortInterest);
            assert_eq!(r.observed, 0.0);
        }
        other => panic!("unexpected: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_report_reaches_every_sink() {
    let (report, _) = run_market(Duration::ZERO, 10).await;

    let mut path = std::env::temp_dir();
    path.push(format!("gapscan_it_{}.json", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();

    let sqlite = SqliteReportSink::in_memory().await.unwrap();
    let sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(JsonReportSink::new(path.clone()))];
    assert_eq!(storage::publish_all(&sinks, &report).await, 1);
    sqlite.publish(&report).await.unwrap();

    let saved = storage::load_report(Some(&path)).unwrap().unwrap();
    assert_eq!(symbols(&saved), symbols(&report));
    assert_eq!(saved.parameters.filters, FilterConfig::default());

    let rows = sqlite.candidates_for(report.run_id).await.unwrap();
    let stored: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(stored, symbols(&report));

    storage::delete_report(Some(&path)).unwrap();
}
