// tests/archive.rs
//! Export bundles read back through a standard ZIP reader

use api_sniffer_engine::export::archive::{
    build_export_archive, ArchiveWriter, HAR_ENTRY, LOGS_ENTRY, META_ENTRY, SUMMARY_ENTRY,
};
use api_sniffer_engine::export::{to_csv, ExportFormat, Exporter};
use api_sniffer_engine::{ApiType, CaptureRecord};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::io::{Cursor, Read};
use zip::ZipArchive;

fn sample() -> Vec<CaptureRecord> {
    vec![CaptureRecord::new(ApiType::Fetch, "https://a/b")
        .with_method("GET")
        .with_status(200)
        .with_duration(12.0)]
}

fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
    let mut entry = archive.by_name(name).unwrap();
    let mut text = String::new();
    entry.read_to_string(&mut text).unwrap();
    text
}

#[test]
fn test_archive_round_trip() {
    let records = sample();
    let exported_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let bytes = build_export_archive(&records, exported_at).unwrap();

    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 4);

    let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec![HAR_ENTRY, LOGS_ENTRY, META_ENTRY, SUMMARY_ENTRY]);

    for index in 0..archive.len() {
        let entry = archive.by_index(index).unwrap();
        assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
        assert_eq!(entry.size(), entry.compressed_size());
    }

    let logs: Value = serde_json::from_str(&read_entry(&mut archive, LOGS_ENTRY)).unwrap();
    assert_eq!(logs, serde_json::to_value(&records).unwrap());

    let har: Value = serde_json::from_str(&read_entry(&mut archive, HAR_ENTRY)).unwrap();
    assert_eq!(har["log"]["version"], "1.2");
    assert_eq!(har["log"]["entries"].as_array().unwrap().len(), 1);

    let summary: Value = serde_json::from_str(&read_entry(&mut archive, SUMMARY_ENTRY)).unwrap();
    assert_eq!(summary["totalEvents"], 1);
    assert_eq!(summary["endpoints"]["GET https://a/b"], 1);

    let meta: Value = serde_json::from_str(&read_entry(&mut archive, META_ENTRY)).unwrap();
    assert_eq!(meta["exportedAt"], "2024-06-01T12:00:00.000Z");
    assert_eq!(meta["version"], api_sniffer_engine::VERSION);
}

#[test]
fn test_many_entries_stay_readable() {
    let mut writer = ArchiveWriter::new(Utc::now());
    for index in 0..200 {
        let body = "x".repeat(index * 7);
        writer.add(&format!("dir/entry-{}.txt", index), body.as_bytes()).unwrap();
    }
    let bytes = writer.finish().unwrap();

    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 200);
    assert_eq!(read_entry(&mut archive, "dir/entry-150.txt").len(), 1050);
    assert_eq!(read_entry(&mut archive, "dir/entry-0.txt"), "");
}

#[test]
fn test_zip_format_matches_archive_builder() {
    let file = Exporter::new(ExportFormat::Zip).export_file(&sample()).unwrap();
    assert!(file.name.starts_with("api-sniffer-"));
    assert!(file.name.ends_with(".zip"));

    let archive = ZipArchive::new(Cursor::new(file.contents.to_vec())).unwrap();
    assert_eq!(archive.len(), 4);
}

#[test]
fn test_csv_of_one_record() {
    let csv = to_csv(&sample());
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 2);

    let url_cell = lines[1].split(',').nth(3).unwrap();
    assert_eq!(url_cell.trim_matches('"'), "https://a/b");
}
