//! Integration tests: full scans over deterministic in-memory sources.

mod mock_source;
mod pipeline;
