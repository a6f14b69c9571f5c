//! Reference data: per-symbol short interest and float.
//!
//! The table is an injected data source refreshed out-of-band. A symbol
//! missing from the table gets the configured defaults; that is a known
//! approximation, not an error.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::ReferenceConfig;
use crate::types::{ReferenceData, Symbol};

/// Abstraction over short-interest / float lookups.
pub trait ReferenceSource: Send + Sync {
    /// Look up a symbol; never fails, falls back to defaults.
    fn lookup(&self, symbol: &Symbol) -> ReferenceData;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// One row of the reference table file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceEntry {
    pub short_interest_percent: f64,
    pub float_shares: u64,
}

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    #[serde(default)]
    symbols: HashMap<String, ReferenceEntry>,
}

/// In-memory reference table with defaults for unknown symbols.
#[derive(Debug, Clone)]
pub struct StaticReferenceTable {
    entries: HashMap<Symbol, ReferenceEntry>,
    default_short_interest: f64,
    default_float_shares: u64,
}

impl StaticReferenceTable {
    pub fn new(default_short_interest: f64, default_float_shares: u64) -> Self {
        Self {
            entries: HashMap::new(),
            default_short_interest,
            default_float_shares,
        }
    }

    /// Add or replace one symbol's entry (builder style).
    pub fn with_entry(mut self, symbol: &str, short_interest_percent: f64, float_shares: u64) -> Self {
        if let Some(sym) = Symbol::parse(symbol) {
            self.entries.insert(
                sym,
                ReferenceEntry {
                    short_interest_percent,
                    float_shares,
                },
            );
        }
        self
    }

    /// Parse a TOML table of the form:
    ///
    /// ```toml
    /// [symbols.GME]
    /// short_interest_percent = 22.5
    /// float_shares = 255000000
    /// ```
    pub fn from_toml(
        contents: &str,
        default_short_interest: f64,
        default_float_shares: u64,
    ) -> Result<Self> {
        let file: ReferenceFile =
            toml::from_str(contents).context("Failed to parse reference table")?;
        let mut table = Self::new(default_short_interest, default_float_shares);
        for (raw, entry) in file.symbols {
            if let Some(sym) = Symbol::parse(&raw) {
                table.entries.insert(sym, entry);
            }
        }
        Ok(table)
    }

    /// Build from config: load the table file if one is configured,
    /// otherwise an empty table that only returns defaults.
    pub fn from_config(cfg: &ReferenceConfig) -> Result<Self> {
        let table = match &cfg.path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read reference table: {path}"))?;
                Self::from_toml(&contents, cfg.default_short_interest, cfg.default_float_shares)
                    .with_context(|| format!("Invalid reference table: {path}"))?
            }
            None => Self::new(cfg.default_short_interest, cfg.default_float_shares),
        };
        info!(entries = table.len(), "Reference table loaded");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReferenceSource for StaticReferenceTable {
    fn lookup(&self, symbol: &Symbol) -> ReferenceData {
        match self.entries.get(symbol) {
            Some(entry) => ReferenceData {
                short_interest_percent: entry.short_interest_percent,
                float_shares: entry.float_shares,
                from_table: true,
            },
            None => {
                debug!(symbol = %symbol, "No reference entry, using defaults");
                ReferenceData {
                    short_interest_percent: self.default_short_interest,
                    float_shares: self.default_float_shares,
                    from_table: false,
                }
            }
        }
    }

    fn name(&self) -> &str {
        "static-table"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_symbol() {
        let table = StaticReferenceTable::new(0.0, 1_000_000_000).with_entry("gme", 22.5, 255_000_000);
        let data = table.lookup(&Symbol::parse("GME").unwrap());
        assert_eq!(data.short_interest_percent, 22.5);
        assert_eq!(data.float_shares, 255_000_000);
        assert!(data.from_table);
    }

    #[test]
    fn test_lookup_missing_symbol_defaults() {
        let table = StaticReferenceTable::new(0.0, 1_000_000_000);
        let data = table.lookup(&Symbol::parse("NOPE").unwrap());
        assert_eq!(data.short_interest_percent, 0.0);
        assert_eq!(data.float_shares, 1_000_000_000);
        assert!(!data.from_table);
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
[symbols.AMC]
short_interest_percent = 18.0
float_shares = 300000000

[symbols.bbig]
short_interest_percent = 30.5
float_shares = 90000000
"#;
        let table = StaticReferenceTable::from_toml(toml, 0.0, 1_000_000_000).unwrap();
        assert_eq!(table.len(), 2);
        let bbig = table.lookup(&Symbol::parse("BBIG").unwrap());
        assert_eq!(bbig.short_interest_percent, 30.5);
    }

    #[test]
    fn test_from_toml_malformed() {
        let toml = "[symbols.AMC]\nshort_interest_percent = \"lots\"\n";
        assert!(StaticReferenceTable::from_toml(toml, 0.0, 1).is_err());
    }

    #[test]
    fn test_from_config_without_path() {
        let table = StaticReferenceTable::from_config(&ReferenceConfig::default()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.name(), "static-table");
    }
}
