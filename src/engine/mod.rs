//! Core engine: filter → score → estimate, driven per symbol by the scanner.

pub mod filters;
pub mod options;
pub mod report;
pub mod scanner;
pub mod scorer;

pub use report::ScanReport;
pub use scanner::Scanner;
