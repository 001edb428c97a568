// src/export/tabular.rs
//! CSV export

use crate::recording::record::CaptureRecord;
use chrono::{SecondsFormat, Utc};

pub const CSV_COLUMNS: [&str; 6] = ["Timestamp", "Type", "Method", "URL", "Status", "Duration"];

/// Quote one cell, doubling embedded quotes
fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn join_row<I, S>(cells: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    cells
        .into_iter()
        .map(|cell| quote(cell.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

fn row(record: &CaptureRecord) -> [String; 6] {
    let timestamp = record
        .parsed_timestamp()
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    // Zero status and zero duration render as empty cells
    let status = record
        .status
        .filter(|s| *s != 0)
        .map(|s| s.to_string())
        .unwrap_or_default();
    let duration = record
        .duration
        .filter(|d| *d != 0.0)
        .map(|d| d.to_string())
        .unwrap_or_default();

    [
        timestamp,
        record.api_type.to_string(),
        record.method.clone().unwrap_or_default(),
        record.url.clone(),
        status,
        duration,
    ]
}

/// Render `records` as CSV, header first, rows joined by `\n`
pub fn to_csv(records: &[CaptureRecord]) -> String {
    std::iter::once(join_row(CSV_COLUMNS))
        .chain(records.iter().map(|record| join_row(row(record))))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::record::ApiType;

    #[test]
    fn test_single_record_two_lines() {
        let record = CaptureRecord::new(ApiType::Fetch, "https://a/b")
            .with_method("GET")
            .with_status(200)
            .with_duration(12.0)
            .with_timestamp("2024-01-01T00:00:00.000Z");

        let csv = to_csv(&[record]);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#""Timestamp","Type","Method","URL","Status","Duration""#
        );
        assert_eq!(
            lines[1],
            r#""2024-01-01T00:00:00.000Z","fetch","GET","https://a/b","200","12""#
        );
    }

    #[test]
    fn test_quotes_are_doubled() {
        let record = CaptureRecord::new(ApiType::Xhr, r#"https://a/?q="x""#);
        let csv = to_csv(&[record]);
        assert!(csv.contains(r#""https://a/?q=""x""""#));
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let record = CaptureRecord::new(ApiType::WebSocket, "wss://a").with_status(0);
        let csv = to_csv(&[record]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.ends_with(r#""websocket","","wss://a","","""#));
    }

    #[test]
    fn test_empty_log_is_header_only() {
        assert_eq!(to_csv(&[]).lines().count(), 1);
    }
}
