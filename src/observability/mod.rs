// src/observability/mod.rs
//! Tracing and metrics initialisation
//!
//! Metric names used across the engine live here so the exporter and the
//! call sites agree on them.

use crate::utils::config::ObservabilitySection;
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Capture records handed to the page bus
pub const CAPTURES_EMITTED: &str = "sniffer_captures_emitted_total";

/// Capture records lost on the page side (gate closed after build, bus without listeners, panics)
pub const CAPTURES_DROPPED: &str = "sniffer_captures_dropped_total";

/// Records appended to the log store
pub const RECORDS_STORED: &str = "sniffer_records_stored_total";

/// Records evicted by the cap or auto-cleanup
pub const RECORDS_EVICTED: &str = "sniffer_records_evicted_total";

/// Messages addressed to a context that no longer exists
pub const RELAY_CONTEXT_GONE: &str = "sniffer_relay_context_gone_total";

/// Current log store length
pub const LOG_STORE_SIZE: &str = "sniffer_log_store_size";

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_tracing(config: &ObservabilitySection) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json_logs {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init()
    };

    result.map_err(|e| EngineError::ConfigError(format!("Failed to install tracing: {}", e)))
}

/// Install the Prometheus metrics recorder and return a handle for rendering
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| EngineError::ConfigError(format!("Failed to install metrics: {}", e)))?;

    metrics::describe_counter!(CAPTURES_EMITTED, "Capture records posted by interceptors");
    metrics::describe_counter!(CAPTURES_DROPPED, "Capture records discarded on the page side");
    metrics::describe_counter!(RECORDS_STORED, "Records appended to the log store");
    metrics::describe_counter!(RECORDS_EVICTED, "Records evicted from the log store");
    metrics::describe_counter!(RELAY_CONTEXT_GONE, "Deliveries to torn-down contexts");
    metrics::describe_gauge!(LOG_STORE_SIZE, "Current number of stored records");

    Ok(handle)
}
