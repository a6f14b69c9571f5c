//! GAPSCAN: gap-down consolidation screener
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the data sources, reference table and report sinks, then runs
//! the scan once or on an interval with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use gapscan::config::AppConfig;
use gapscan::dashboard::{self, DashboardSink, DashboardState};
use gapscan::engine::{ScanReport, Scanner};
use gapscan::providers::{self, router::ProviderRouter};
use gapscan::reference::{ReferenceSource, StaticReferenceTable};
use gapscan::storage::{self, sqlite::SqliteReportSink, JsonReportSink, ReportSink};
use gapscan::universe::Universe;

const BANNER: &str = r#"
  ____    _    ____  ____   ____    _    _   _
 / ___|  / \  |  _ \/ ___| / ___|  / \  | \ | |
| |  _  / _ \ | |_) \___ \| |     / _ \ |  \| |
| |_| |/ ___ \|  __/ ___) | |___ / ___ \| |\  |
 \____/_/   \_\_|   |____/ \____/_/   \_\_| \_|

  Gap-down consolidation screener
  v0.1.0
"#;

/// Config path when `GAPSCAN_CONFIG` is not set.
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Configuration errors are fatal before any fetch
    let config_path =
        std::env::var("GAPSCAN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        scanner = %cfg.scanner.name,
        config = %config_path,
        sources = ?cfg.providers.sources,
        lookback_days = cfg.scanner.lookback_days,
        "GAPSCAN starting up"
    );

    // -- Initialise components -------------------------------------------

    let universe = Universe::from_config(&cfg.scanner)?;
    info!(symbols = universe.len(), "Universe loaded");

    let router = ProviderRouter::new(providers::build_sources(&cfg.providers)?);
    let reference: Arc<dyn ReferenceSource> =
        Arc::new(StaticReferenceTable::from_config(&cfg.reference)?);
    let scanner = Scanner::from_config(&cfg, router, reference);

    // Report sinks
    let mut sinks: Vec<Box<dyn ReportSink>> =
        vec![Box::new(JsonReportSink::new(cfg.report.json_path.clone()))];

    if let Some(url) = &cfg.report.sqlite_url {
        match SqliteReportSink::connect(url).await {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => warn!(error = %e, "SQLite sink unavailable, continuing without"),
        }
    }

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new());
        // Seed with the last saved report so the page isn't empty on restart
        match storage::load_report(Some(&cfg.report.json_path)) {
            Ok(Some(previous)) => state.record(&previous).await,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable previous report"),
        }
        dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port).await?;
        sinks.push(Box::new(DashboardSink::new(state)));
    }

    // -- Run -------------------------------------------------------------

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    match cfg.scanner.scan_interval_secs {
        None => {
            tokio::select! {
                report = scanner.run(&universe) => {
                    log_report(&report);
                    storage::publish_all(&sinks, &report).await;
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    return Ok(());
                }
            }

            if cfg.dashboard.enabled {
                info!("Scan finished; dashboard still serving. Press Ctrl+C to stop.");
                shutdown.await?;
            }
        }
        Some(secs) => {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            info!(interval_secs = secs, "Entering scan loop. Press Ctrl+C to stop.");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = scanner.run(&universe).await;
                        log_report(&report);
                        storage::publish_all(&sinks, &report).await;
                    }
                    _ = &mut shutdown => {
                        info!("Shutdown signal received.");
                        break;
                    }
                }
            }
        }
    }

    info!("GAPSCAN shut down cleanly.");
    Ok(())
}

/// Print the ranked top-N and log the survivor funnel.
fn log_report(report: &ScanReport) {
    println!("{report}");

    for (step, survivors) in report.counts.funnel() {
        info!(step = %step, survivors, "Funnel");
    }

    if report.candidates.is_empty() {
        info!(run_id = %report.run_id, "No candidates this run");
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gapscan=info"));

    let json_logging = std::env::var("GAPSCAN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
