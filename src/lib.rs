// src/lib.rs
//! API Sniffer Engine Library
//!
//! Captures outbound network activity of a host application, relays it to a
//! single authoritative store, and re-exports it in interchange formats.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **interception**: Instrumented fetch/xhr/socket/event-stream surfaces
//! - **relay**: Page contexts, bridges and the message protocol between them
//! - **recording**: Capture records, the bounded event store and its authority task
//! - **analytics**: Log filtering and on-demand statistics
//! - **export**: JSON, HAR, CSV, Postman and store-only ZIP serializers
//! - **observability**: Tracing and metrics
//! - **utils**: Configuration and errors

// Public module exports
pub mod analytics;
pub mod export;
pub mod interception;
pub mod observability;
pub mod recording;
pub mod relay;
pub mod utils;

// Re-export commonly used types
pub use analytics::{compute_stats, filter_logs, LogFilters, LogStats};
pub use export::{ExportFormat, Exporter};
pub use recording::record::{ApiType, CaptureRecord};
pub use recording::service::{AuthorityHandle, AuthorityService};
pub use relay::{BridgeHandle, PageContext, RelayBridge};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
