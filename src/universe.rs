//! Universe registry: the ordered, duplicate-free list of symbols to scan.

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::debug;

use crate::config::ScannerConfig;
use crate::types::Symbol;

/// Ordered set of symbols. Deduplicated at construction, immutable after.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    symbols: Vec<Symbol>,
}

impl Universe {
    /// Build from raw tickers, keeping first occurrence order.
    /// Blank entries are skipped; case differences collapse to one symbol.
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut symbols = Vec::new();
        let mut duplicates = 0usize;

        for entry in raw {
            let Some(symbol) = Symbol::parse(entry.as_ref()) else {
                continue;
            };
            if seen.insert(symbol.clone()) {
                symbols.push(symbol);
            } else {
                duplicates += 1;
            }
        }

        if duplicates > 0 {
            debug!(duplicates, kept = symbols.len(), "Dropped duplicate tickers");
        }

        Self { symbols }
    }

    /// Parse a universe file: one ticker per line, `#` starts a comment,
    /// commas are also accepted as separators.
    pub fn parse_list(contents: &str) -> Self {
        let tickers = contents
            .lines()
            .map(|line| line.split('#').next().unwrap_or(""))
            .flat_map(|line| line.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        Self::new(tickers)
    }

    /// Build the universe from the scanner config: inline list first,
    /// then the universe file.
    pub fn from_config(cfg: &ScannerConfig) -> Result<Self> {
        let mut raw: Vec<String> = cfg.universe.clone();
        if let Some(path) = &cfg.universe_file {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read universe file: {path}"))?;
            raw.extend(
                Self::parse_list(&contents)
                    .symbols
                    .into_iter()
                    .map(|s| s.as_str().to_string()),
            );
        }
        Ok(Self::new(raw))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_symbol_yielded_once() {
        let u = Universe::new(["GME", "AMC", "GME"]);
        assert_eq!(u.len(), 2);
        let names: Vec<&str> = u.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["GME", "AMC"]);
    }

    #[test]
    fn test_case_insensitive_dedup_keeps_first_position() {
        let u = Universe::new(["bbby", "SNDL", "BBBY ", " sndl"]);
        let names: Vec<&str> = u.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["BBBY", "SNDL"]);
    }

    #[test]
    fn test_blank_entries_skipped() {
        let u = Universe::new(["", "  ", "TLRY"]);
        assert_eq!(u.len(), 1);
        assert!(u.contains(&Symbol::parse("tlry").unwrap()));
    }

    #[test]
    fn test_parse_list_with_comments() {
        let u = Universe::parse_list("# watchlist\nAAA\nBBB, CCC # small caps\n\naaa\n");
        let names: Vec<&str> = u.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["AAA", "BBB", "CCC"]);
    }

    #[test]
    fn test_from_config_merges_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("gapscan_universe_{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "ZZZ\nAAA\n").unwrap();

        let cfg = ScannerConfig {
            name: "t".into(),
            universe: vec!["AAA".into(), "BBB".into()],
            universe_file: Some(path.to_string_lossy().to_string()),
            lookback_days: 30,
            request_delay_ms: 0,
            top_n: 3,
            scan_interval_secs: None,
        };
        let u = Universe::from_config(&cfg).unwrap();
        let names: Vec<&str> = u.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["AAA", "BBB", "ZZZ"]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_from_config_missing_file_errors() {
        let cfg = ScannerConfig {
            name: "t".into(),
            universe: vec![],
            universe_file: Some("/nonexistent/gapscan_universe.txt".into()),
            lookback_days: 30,
            request_delay_ms: 0,
            top_n: 3,
            scan_interval_secs: None,
        };
        assert!(Universe::from_config(&cfg).is_err());
    }
}
