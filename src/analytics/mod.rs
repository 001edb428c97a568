// src/analytics/mod.rs
//! Filtering and statistics over log snapshots
//!
//! Pure functions; callers pass a snapshot taken from the event store.

pub mod filter;
pub mod stats;

pub use filter::{filter_logs, LogFilters, StatusFilter};
pub use stats::{compute_stats, LogStats, StatusGroup};
