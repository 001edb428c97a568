// src/export/archive.rs
//! Store-only ZIP writer
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! [local header 1][data 1] ... [local header n][data n]
//! [central record 1] ... [central record n]
//! [end of central directory]
//! ```
//!
//! Entries are never compressed (method 0), so compressed and uncompressed
//! sizes are equal. ZIP64 is not supported; archives beyond the classic
//! limits are rejected.

use crate::export::crc32;
use crate::export::har::build_har;
use crate::recording::record::CaptureRecord;
use crate::utils::errors::{EngineError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, SecondsFormat, Timelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4B50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4B50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4B50;

const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_HEADER_LEN: usize = 46;
const END_RECORD_LEN: usize = 22;

/// 2.0: stored entries, no ZIP64
const VERSION: u16 = 20;
const METHOD_STORED: u16 = 0;

pub const MAX_ENTRIES: usize = u16::MAX as usize;
pub const MAX_OFFSET: u64 = u32::MAX as u64;

pub const LOGS_ENTRY: &str = "api_logs.json";
pub const HAR_ENTRY: &str = "api_logs.har";
pub const SUMMARY_ENTRY: &str = "summary.json";
pub const META_ENTRY: &str = "meta.json";

/// MS-DOS packed (time, date); instants before 1980 clamp to its start
pub fn dos_datetime(instant: &DateTime<Utc>) -> (u16, u16) {
    if instant.year() < 1980 {
        return (0, (1 << 5) | 1);
    }
    let time = (instant.hour() << 11) | (instant.minute() << 5) | (instant.second() / 2);
    let date = (((instant.year() - 1980) as u32) << 9) | (instant.month() << 5) | instant.day();
    (time as u16, date as u16)
}

struct CentralRecord {
    name: Vec<u8>,
    crc: u32,
    size: u32,
    offset: u32,
}

/// Incremental archive builder
pub struct ArchiveWriter {
    buffer: BytesMut,
    central: Vec<CentralRecord>,
    dos_time: u16,
    dos_date: u16,
}

impl ArchiveWriter {
    /// Every entry is stamped with `modified`
    pub fn new(modified: DateTime<Utc>) -> Self {
        let (dos_time, dos_date) = dos_datetime(&modified);
        Self {
            buffer: BytesMut::new(),
            central: Vec::new(),
            dos_time,
            dos_date,
        }
    }

    pub fn len(&self) -> usize {
        self.central.len()
    }

    pub fn is_empty(&self) -> bool {
        self.central.is_empty()
    }

    /// Append one stored entry
    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if self.central.len() >= MAX_ENTRIES {
            return Err(EngineError::ArchiveFailed(format!(
                "more than {} entries",
                MAX_ENTRIES
            )));
        }
        let name_len = u16::try_from(name.len())
            .map_err(|_| EngineError::ArchiveFailed(format!("entry name too long: {}", name)))?;
        let size = u32::try_from(data.len())
            .map_err(|_| EngineError::ArchiveFailed(format!("entry {} exceeds 4 GiB", name)))?;

        let offset = self.buffer.len() as u64;
        let end = offset + (LOCAL_HEADER_LEN + name.len() + data.len()) as u64;
        if end > MAX_OFFSET {
            return Err(EngineError::ArchiveFailed(format!(
                "archive exceeds 4 GiB at entry {}",
                name
            )));
        }

        let crc = crc32::checksum(data);

        self.buffer.reserve(LOCAL_HEADER_LEN + name.len() + data.len());
        self.buffer.put_u32_le(LOCAL_HEADER_SIGNATURE);
        self.buffer.put_u16_le(VERSION);
        self.buffer.put_u16_le(0); // flags
        self.buffer.put_u16_le(METHOD_STORED);
        self.buffer.put_u16_le(self.dos_time);
        self.buffer.put_u16_le(self.dos_date);
        self.buffer.put_u32_le(crc);
        self.buffer.put_u32_le(size); // compressed
        self.buffer.put_u32_le(size); // uncompressed
        self.buffer.put_u16_le(name_len);
        self.buffer.put_u16_le(0); // extra field length
        self.buffer.put_slice(name.as_bytes());
        self.buffer.put_slice(data);

        self.central.push(CentralRecord {
            name: name.as_bytes().to_vec(),
            crc,
            size,
            offset: offset as u32,
        });

        debug!("Archived {} ({} bytes, crc {:08x})", name, size, crc);
        Ok(())
    }

    /// Write the central directory and end record
    pub fn finish(self) -> Result<Bytes> {
        let ArchiveWriter {
            mut buffer,
            central,
            dos_time,
            dos_date,
        } = self;

        let directory_offset = buffer.len() as u64;
        let directory_len: usize = central
            .iter()
            .map(|record| CENTRAL_HEADER_LEN + record.name.len())
            .sum();
        if directory_offset + (directory_len + END_RECORD_LEN) as u64 > MAX_OFFSET {
            return Err(EngineError::ArchiveFailed(
                "central directory exceeds 4 GiB".to_string(),
            ));
        }

        buffer.reserve(directory_len + END_RECORD_LEN);
        for record in &central {
            buffer.put_u32_le(CENTRAL_HEADER_SIGNATURE);
            buffer.put_u16_le(VERSION); // made by
            buffer.put_u16_le(VERSION); // needed to extract
            buffer.put_u16_le(0); // flags
            buffer.put_u16_le(METHOD_STORED);
            buffer.put_u16_le(dos_time);
            buffer.put_u16_le(dos_date);
            buffer.put_u32_le(record.crc);
            buffer.put_u32_le(record.size);
            buffer.put_u32_le(record.size);
            buffer.put_u16_le(record.name.len() as u16);
            buffer.put_u16_le(0); // extra field length
            buffer.put_u16_le(0); // comment length
            buffer.put_u16_le(0); // disk number start
            buffer.put_u16_le(0); // internal attributes
            buffer.put_u32_le(0); // external attributes
            buffer.put_u32_le(record.offset);
            buffer.put_slice(&record.name);
        }

        let count = central.len() as u16;
        buffer.put_u32_le(END_OF_CENTRAL_DIRECTORY_SIGNATURE);
        buffer.put_u16_le(0); // this disk
        buffer.put_u16_le(0); // disk holding the directory
        buffer.put_u16_le(count);
        buffer.put_u16_le(count);
        buffer.put_u32_le(directory_len as u32);
        buffer.put_u32_le(directory_offset as u32);
        buffer.put_u16_le(0); // comment length

        Ok(buffer.freeze())
    }
}

/// `summary.json` contents
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub total_events: usize,

    /// Calls per `"METHOD url"`; records lacking either are not counted
    pub endpoints: BTreeMap<String, usize>,
}

impl ArchiveSummary {
    pub fn of(records: &[CaptureRecord]) -> Self {
        let mut endpoints = BTreeMap::new();
        for record in records {
            let Some(method) = record.method.as_deref() else {
                continue;
            };
            if record.url.is_empty() || method.is_empty() {
                continue;
            }
            *endpoints
                .entry(format!("{} {}", method, record.url))
                .or_insert(0) += 1;
        }
        Self {
            total_events: records.len(),
            endpoints,
        }
    }
}

/// `meta.json` contents
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMeta {
    pub version: String,
    pub exported_at: String,
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| EngineError::ExportFailed(format!("JSON serialization error: {}", e)))
}

/// Bundle the raw log, its HAR document, a summary and metadata
pub fn build_export_archive(
    records: &[CaptureRecord],
    exported_at: DateTime<Utc>,
) -> Result<Bytes> {
    let meta = ArchiveMeta {
        version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    let mut writer = ArchiveWriter::new(exported_at);
    writer.add(LOGS_ENTRY, &pretty(records)?)?;
    writer.add(HAR_ENTRY, &pretty(&build_har(records))?)?;
    writer.add(SUMMARY_ENTRY, &pretty(&ArchiveSummary::of(records))?)?;
    writer.add(META_ENTRY, &pretty(&meta)?)?;
    writer.finish()
}
