//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every screening threshold must be present in the file; a missing or
//! malformed threshold fails the load before any data is fetched.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::types::ScanError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub filters: FilterConfig,
    pub options: OptionsConfig,
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub name: String,
    /// Inline universe; merged (in order) with `universe_file` if both are set.
    #[serde(default)]
    pub universe: Vec<String>,
    /// One ticker per line, `#` starts a comment.
    #[serde(default)]
    pub universe_file: Option<String>,
    /// Daily bars requested per symbol.
    pub lookback_days: u32,
    /// Fixed pause after every symbol, success or not.
    pub request_delay_ms: u64,
    /// How many leading candidates the report highlights.
    pub top_n: usize,
    /// Repeat the scan on this interval; a single run when absent.
    #[serde(default)]
    pub scan_interval_secs: Option<u64>,
}

/// Thresholds for the filter cascade. All inclusive.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilterConfig {
    pub max_price: f64,
    pub gap_min_percent: f64,
    pub gap_max_percent: f64,
    pub consolidation_min_percent: f64,
    pub consolidation_max_percent: f64,
    pub max_rsi: f64,
    pub min_volume: u64,
    pub min_trend_score: f64,
    pub min_short_interest: f64,
    pub max_float_shares: u64,
    /// Final composite-score floor applied after scoring.
    #[serde(default)]
    pub min_score: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_price: 20.0,
            gap_min_percent: -15.0,
            gap_max_percent: -3.0,
            consolidation_min_percent: 1.0,
            consolidation_max_percent: 8.0,
            max_rsi: 50.0,
            min_volume: 500_000,
            min_trend_score: 30.0,
            min_short_interest: 5.0,
            max_float_shares: 500_000_000,
            min_score: 0.0,
        }
    }
}

/// Bounds for the synthetic option plays.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OptionsConfig {
    pub min_premium: Decimal,
    pub max_premium: Decimal,
    pub max_otm_percent: f64,
    /// Strikes must be strictly below this.
    pub max_strike: Decimal,
    pub max_plays: usize,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            min_premium: dec!(0.01),
            max_premium: dec!(0.10),
            max_otm_percent: 15.0,
            max_strike: dec!(100),
            max_plays: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    /// Data sources in priority order: the first is primary, the rest are
    /// fallbacks tried only on failure. Known: "yahoo", "alphavantage".
    pub sources: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub alphavantage_key_env: Option<String>,
}

fn default_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReferenceConfig {
    /// TOML table of per-symbol short interest and float.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub default_short_interest: f64,
    #[serde(default = "default_float_shares")]
    pub default_float_shares: u64,
}

fn default_float_shares() -> u64 {
    1_000_000_000
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_short_interest: 0.0,
            default_float_shares: default_float_shares(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_report_path")]
    pub json_path: String,
    /// e.g. `sqlite://gapscan.db?mode=rwc`
    #[serde(default)]
    pub sqlite_url: Option<String>,
}

fn default_report_path() -> String {
    "gapscan_report.json".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            json_path: default_report_path(),
            sqlite_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub port: u16,
}

/// Sources the provider factory knows how to build.
pub const KNOWN_SOURCES: &[&str] = &["yahoo", "alphavantage"];

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a meaningful scan.
    pub fn validate(&self) -> Result<(), ScanError> {
        self.filters.validate()?;
        self.options.validate()?;

        if self.scanner.universe.is_empty() && self.scanner.universe_file.is_none() {
            return Err(ScanError::Config(
                "scanner.universe or scanner.universe_file must be set".into(),
            ));
        }
        if self.scanner.lookback_days < 15 {
            return Err(ScanError::Config(format!(
                "scanner.lookback_days must be at least 15, got {}",
                self.scanner.lookback_days
            )));
        }
        if self.scanner.scan_interval_secs == Some(0) {
            return Err(ScanError::Config(
                "scanner.scan_interval_secs must be positive; omit it for a single run".into(),
            ));
        }
        if self.providers.sources.is_empty() {
            return Err(ScanError::Config("providers.sources is empty".into()));
        }
        for source in &self.providers.sources {
            if !KNOWN_SOURCES.contains(&source.as_str()) {
                return Err(ScanError::Config(format!("Unknown data source: {source}")));
            }
        }
        if self.dashboard.enabled && self.dashboard.port == 0 {
            return Err(ScanError::Config("dashboard.port must be set when enabled".into()));
        }
        Ok(())
    }

    /// Resolve an env-var reference to a secret, if both are present.
    pub fn resolve_secret(env_name: Option<&str>) -> Option<SecretString> {
        env_name
            .and_then(|name| std::env::var(name).ok())
            .filter(|v| !v.is_empty())
            .map(SecretString::new)
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        let finite = [
            self.max_price,
            self.gap_min_percent,
            self.gap_max_percent,
            self.consolidation_min_percent,
            self.consolidation_max_percent,
            self.max_rsi,
            self.min_trend_score,
            self.min_short_interest,
            self.min_score,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(ScanError::Config("filter thresholds must be finite".into()));
        }
        if self.max_price <= 0.0 {
            return Err(ScanError::Config("filters.max_price must be positive".into()));
        }
        if self.gap_min_percent > self.gap_max_percent {
            return Err(ScanError::Config(format!(
                "filters.gap_min_percent ({}) exceeds gap_max_percent ({})",
                self.gap_min_percent, self.gap_max_percent
            )));
        }
        if self.consolidation_min_percent < 0.0
            || self.consolidation_min_percent > self.consolidation_max_percent
        {
            return Err(ScanError::Config(format!(
                "filters.consolidation band [{}, {}] is invalid",
                self.consolidation_min_percent, self.consolidation_max_percent
            )));
        }
        if !(0.0..=100.0).contains(&self.max_rsi) {
            return Err(ScanError::Config("filters.max_rsi must be within 0–100".into()));
        }
        if !(0.0..=100.0).contains(&self.min_trend_score) {
            return Err(ScanError::Config(
                "filters.min_trend_score must be within 0–100".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.min_score) {
            return Err(ScanError::Config("filters.min_score must be within 0–100".into()));
        }
        if self.min_short_interest < 0.0 {
            return Err(ScanError::Config(
                "filters.min_short_interest must not be negative".into(),
            ));
        }
        Ok(())
    }
}

impl OptionsConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.min_premium <= Decimal::ZERO || self.min_premium > self.max_premium {
            return Err(ScanError::Config(format!(
                "options premium band [{}, {}] is invalid",
                self.min_premium, self.max_premium
            )));
        }
        if !self.max_otm_percent.is_finite() || self.max_otm_percent < 0.0 {
            return Err(ScanError::Config("options.max_otm_percent must be >= 0".into()));
        }
        if self.max_strike <= Decimal::ZERO {
            return Err(ScanError::Config("options.max_strike must be positive".into()));
        }
        if self.max_plays == 0 {
            return Err(ScanError::Config("options.max_plays must be at least 1".into()));
        }
        Ok(())
    }
}
