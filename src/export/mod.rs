// src/export/mod.rs
//! Export log snapshots to interchange formats
//!
//! Supports:
//! - JSON (the raw record array)
//! - HAR 1.2 (HTTP archive tooling)
//! - CSV (spreadsheets)
//! - Postman collection v2.1
//! - ZIP bundle of the above plus a summary

pub mod archive;
pub mod crc32;
pub mod har;
pub mod postman;
pub mod tabular;

use crate::recording::record::CaptureRecord;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

pub use archive::{build_export_archive, ArchiveSummary, ArchiveWriter};
pub use har::{build_har, HarDocument};
pub use postman::{build_collection, Collection};
pub use tabular::to_csv;

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// Pretty-printed record array
    Json,

    /// HTTP Archive document
    Har,

    /// Quoted comma-separated rows
    Csv,

    /// Postman collection
    Postman,

    /// Store-only ZIP bundle
    Zip,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Json,
        ExportFormat::Har,
        ExportFormat::Csv,
        ExportFormat::Postman,
        ExportFormat::Zip,
    ];

    /// File name suffix, without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Har => "har",
            ExportFormat::Csv => "csv",
            ExportFormat::Postman => "postman_collection.json",
            ExportFormat::Zip => "zip",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json | ExportFormat::Har | ExportFormat::Postman => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Zip => "application/zip",
        }
    }

    /// `api-sniffer-<unix millis>.<extension>`
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        format!("api-sniffer-{}.{}", at.timestamp_millis(), self.extension())
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExportFormat::Json => "json",
            ExportFormat::Har => "har",
            ExportFormat::Csv => "csv",
            ExportFormat::Postman => "postman",
            ExportFormat::Zip => "zip",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "har" => Ok(ExportFormat::Har),
            "csv" => Ok(ExportFormat::Csv),
            "postman" => Ok(ExportFormat::Postman),
            "zip" => Ok(ExportFormat::Zip),
            other => Err(EngineError::ExportFailed(format!(
                "unknown export format: {}",
                other
            ))),
        }
    }
}

/// One rendered export, ready to be written or downloaded
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub name: String,
    pub mime_type: &'static str,
    pub contents: Bytes,
}

impl ExportFile {
    /// Write into `dir` under the export's own name
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.name);
        tokio::fs::write(&path, &self.contents).await?;
        info!("Exported {} bytes to {}", self.contents.len(), path.display());
        Ok(path)
    }
}

/// Exporter for log snapshots
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Render `records`, stamping time-dependent fields with `at`
    pub fn export_at(&self, records: &[CaptureRecord], at: DateTime<Utc>) -> Result<Bytes> {
        debug!("Exporting {} records to {} format", records.len(), self.format);

        match self.format {
            ExportFormat::Json => json_bytes(records),
            ExportFormat::Har => json_bytes(&build_har(records)),
            ExportFormat::Csv => Ok(Bytes::from(to_csv(records))),
            ExportFormat::Postman => json_bytes(&build_collection(records)),
            ExportFormat::Zip => build_export_archive(records, at),
        }
    }

    pub fn export(&self, records: &[CaptureRecord]) -> Result<Bytes> {
        self.export_at(records, Utc::now())
    }

    /// Render `records` into a named file
    pub fn export_file(&self, records: &[CaptureRecord]) -> Result<ExportFile> {
        let now = Utc::now();
        Ok(ExportFile {
            name: self.format.file_name(now),
            mime_type: self.format.mime_type(),
            contents: self.export_at(records, now)?,
        })
    }
}

fn json_bytes<T: serde::Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec_pretty(value)
        .map(Bytes::from)
        .map_err(|e| EngineError::ExportFailed(format!("JSON serialization error: {}", e)))
}
