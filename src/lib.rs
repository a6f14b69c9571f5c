//! GAPSCAN: gap-down consolidation screener
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod universe;
pub mod providers;
pub mod indicators;
pub mod reference;
pub mod engine;
pub mod storage;
pub mod dashboard;
