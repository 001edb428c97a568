// src/analytics/stats.rs
//! Aggregate statistics over a log snapshot

use crate::recording::record::CaptureRecord;
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of entries kept in each extreme ranking
pub const TOP_N: usize = 10;

/// Status code bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusGroup {
    Success,
    Redirect,
    ClientError,
    ServerError,
    Other,
}

impl StatusGroup {
    pub fn of(status: Option<u16>) -> Self {
        match status {
            Some(200..=299) => StatusGroup::Success,
            Some(300..=399) => StatusGroup::Redirect,
            Some(400..=499) => StatusGroup::ClientError,
            Some(500..=599) => StatusGroup::ServerError,
            _ => StatusGroup::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusGroup::Success => "2xx Success",
            StatusGroup::Redirect => "3xx Redirect",
            StatusGroup::ClientError => "4xx Client Error",
            StatusGroup::ServerError => "5xx Server Error",
            StatusGroup::Other => "Other",
        }
    }
}

fn is_error(record: &CaptureRecord) -> bool {
    matches!(record.status, Some(s) if s >= 400)
}

/// Entry of the slowest/fastest rankings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationEntry {
    pub url: String,
    pub method: Option<String>,
    pub duration: f64,
    pub timestamp: String,
}

/// Entry of the largest-response ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeEntry {
    pub url: String,
    pub method: Option<String>,
    pub size: u64,
    pub timestamp: String,
}

/// One minute of activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBucket {
    /// Start of the minute, UTC
    pub timestamp: String,
    pub count: usize,
    pub errors: usize,
    pub avg_duration: f64,
}

/// Result of [`compute_stats`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_method: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub by_domain: BTreeMap<String, usize>,
    pub errors: usize,

    /// Mean over records that carry a duration, 0 when none do
    pub avg_duration: f64,
    pub slowest: Vec<DurationEntry>,
    pub fastest: Vec<DurationEntry>,
    pub largest: Vec<SizeEntry>,
    pub timeline: Vec<TimelineBucket>,
}

impl LogStats {
    /// Error percentage, 0 for an empty log
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.errors as f64 / self.total as f64 * 100.0
        }
    }

    /// Most active domains, highest count first; ties by name
    pub fn top_domains(&self, limit: usize) -> Vec<(String, usize)> {
        let mut domains: Vec<(String, usize)> = self
            .by_domain
            .iter()
            .map(|(domain, count)| (domain.clone(), *count))
            .collect();
        domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        domains.truncate(limit);
        domains
    }

    /// Plain-text summary
    pub fn text_report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LogStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "API Sniffer Statistics Report")?;
        writeln!(f, "=============================")?;
        writeln!(f)?;
        writeln!(f, "Total Requests: {}", self.total)?;
        writeln!(f, "Errors: {} ({:.1}%)", self.errors, self.error_rate())?;
        writeln!(f, "Average Duration: {:.0}ms", self.avg_duration)?;

        write_section(f, "By Type", &self.by_type)?;
        write_section(f, "By Method", &self.by_method)?;
        write_section(f, "By Status", &self.by_status)?;

        writeln!(f)?;
        writeln!(f, "Top Domains:")?;
        for (domain, count) in self.top_domains(TOP_N) {
            writeln!(f, "  {}: {}", domain, count)?;
        }

        writeln!(f)?;
        writeln!(f, "Slowest Requests:")?;
        for (i, entry) in self.slowest.iter().take(5).enumerate() {
            writeln!(
                f,
                "  {}. {} {} - {:.0}ms",
                i + 1,
                entry.method.as_deref().unwrap_or("-"),
                entry.url,
                entry.duration
            )?;
        }
        Ok(())
    }
}

fn write_section(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    counts: &BTreeMap<String, usize>,
) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "{}:", title)?;
    for (key, count) in counts {
        writeln!(f, "  {}: {}", key, count)?;
    }
    Ok(())
}

#[derive(Default)]
struct BucketAcc {
    count: usize,
    errors: usize,
    duration_sum: f64,
    timed: usize,
}

fn minute_of(record: &CaptureRecord) -> Option<DateTime<Utc>> {
    record
        .parsed_timestamp()?
        .with_second(0)?
        .with_nanosecond(0)
}

fn duration_entry(record: &CaptureRecord, duration: f64) -> DurationEntry {
    DurationEntry {
        url: record.url.clone(),
        method: record.method.clone(),
        duration,
        timestamp: record.timestamp.clone(),
    }
}

/// Aggregate a snapshot; total over any input, including an empty one
pub fn compute_stats(records: &[CaptureRecord]) -> LogStats {
    let mut stats = LogStats {
        total: records.len(),
        ..Default::default()
    };

    let mut duration_sum = 0.0;
    let mut timed = 0usize;
    let mut buckets: BTreeMap<DateTime<Utc>, BucketAcc> = BTreeMap::new();

    for record in records {
        *stats.by_type.entry(record.api_type.to_string()).or_default() += 1;
        if let Some(method) = &record.method {
            *stats.by_method.entry(method.clone()).or_default() += 1;
        }
        *stats
            .by_status
            .entry(StatusGroup::of(record.status).label().to_string())
            .or_default() += 1;
        if let Some(host) = record.host() {
            *stats.by_domain.entry(host).or_default() += 1;
        }

        let error = is_error(record);
        if error {
            stats.errors += 1;
        }

        let duration = record.duration.filter(|d| d.is_finite());
        if let Some(d) = duration {
            duration_sum += d;
            timed += 1;
        }

        if let Some(minute) = minute_of(record) {
            let bucket = buckets.entry(minute).or_default();
            bucket.count += 1;
            if error {
                bucket.errors += 1;
            }
            if let Some(d) = duration {
                bucket.duration_sum += d;
                bucket.timed += 1;
            }
        }
    }

    if timed > 0 {
        stats.avg_duration = duration_sum / timed as f64;
    }

    let mut timings: Vec<DurationEntry> = records
        .iter()
        .filter_map(|r| {
            r.duration
                .filter(|d| d.is_finite())
                .map(|d| duration_entry(r, d))
        })
        .collect();

    // Stable sorts keep arrival order among ties
    timings.sort_by(|a, b| b.duration.total_cmp(&a.duration));
    stats.slowest = timings.iter().take(TOP_N).cloned().collect();

    timings.retain(|entry| entry.duration > 0.0);
    timings.sort_by(|a, b| a.duration.total_cmp(&b.duration));
    stats.fastest = timings.into_iter().take(TOP_N).collect();

    let mut sizes: Vec<SizeEntry> = records
        .iter()
        .filter_map(|r| {
            r.response_size().map(|size| SizeEntry {
                url: r.url.clone(),
                method: r.method.clone(),
                size,
                timestamp: r.timestamp.clone(),
            })
        })
        .collect();
    sizes.sort_by(|a, b| b.size.cmp(&a.size));
    sizes.truncate(TOP_N);
    stats.largest = sizes;

    stats.timeline = buckets
        .into_iter()
        .map(|(minute, acc)| TimelineBucket {
            timestamp: minute.to_rfc3339_opts(SecondsFormat::Millis, true),
            count: acc.count,
            errors: acc.errors,
            avg_duration: if acc.timed > 0 {
                acc.duration_sum / acc.timed as f64
            } else {
                0.0
            },
        })
        .collect();

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::record::{ApiType, BodyPreview};

    fn rec(url: &str, status: u16, duration: f64, ts: &str) -> CaptureRecord {
        CaptureRecord::new(ApiType::Fetch, url)
            .with_method("GET")
            .with_status(status)
            .with_duration(duration)
            .with_timestamp(ts)
    }

    #[test]
    fn test_empty_input() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.avg_duration, 0.0);
        assert!(stats.timeline.is_empty());
        assert!(stats.slowest.is_empty());
        assert_eq!(stats.error_rate(), 0.0);
    }

    #[test]
    fn test_groups_and_errors() {
        let records = vec![
            rec("https://a.com/1", 200, 10.0, "2024-01-01T10:00:05.000Z"),
            rec("https://a.com/2", 404, 30.0, "2024-01-01T10:00:40.000Z"),
            rec("https://b.com/3", 503, 50.0, "2024-01-01T10:01:00.000Z"),
            CaptureRecord::new(ApiType::WebSocket, "wss://c.com/live")
                .with_timestamp("2024-01-01T10:01:30.000Z"),
        ];

        let stats = compute_stats(&records);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.by_status["2xx Success"], 1);
        assert_eq!(stats.by_status["4xx Client Error"], 1);
        assert_eq!(stats.by_status["5xx Server Error"], 1);
        assert_eq!(stats.by_status["Other"], 1);
        assert_eq!(stats.by_type["fetch"], 3);
        assert_eq!(stats.by_type["websocket"], 1);
        assert_eq!(stats.by_method["GET"], 3);
        assert_eq!(stats.by_domain["a.com"], 2);
        assert_eq!(stats.avg_duration, 30.0);
        assert_eq!(stats.error_rate(), 50.0);
    }

    #[test]
    fn test_timeline_buckets_by_minute() {
        let records = vec![
            rec("https://a.com/1", 200, 10.0, "2024-01-01T10:01:59.999Z"),
            rec("https://a.com/2", 500, 20.0, "2024-01-01T10:00:01.000Z"),
            rec("https://a.com/3", 200, 40.0, "2024-01-01T10:00:30.000Z"),
            rec("https://a.com/4", 200, 1.0, "garbage"),
        ];

        let stats = compute_stats(&records);
        assert_eq!(stats.timeline.len(), 2);
        assert_eq!(stats.timeline[0].timestamp, "2024-01-01T10:00:00.000Z");
        assert_eq!(stats.timeline[0].count, 2);
        assert_eq!(stats.timeline[0].errors, 1);
        assert_eq!(stats.timeline[0].avg_duration, 30.0);
        assert_eq!(stats.timeline[1].count, 1);
    }

    #[test]
    fn test_extremes() {
        let ts = "2024-01-01T10:00:00.000Z";
        let records = vec![
            rec("https://a.com/slow", 200, 900.0, ts),
            rec("https://a.com/zero", 200, 0.0, ts),
            rec("https://a.com/fast", 200, 3.0, ts)
                .with_response_body(BodyPreview::Binary { size: 4096 }),
            rec("https://a.com/mid", 200, 50.0, ts)
                .with_response_body(BodyPreview::Text { value: "hi".into() }),
        ];

        let stats = compute_stats(&records);
        assert_eq!(stats.slowest[0].url, "https://a.com/slow");
        assert_eq!(stats.slowest.len(), 4);
        assert_eq!(stats.fastest[0].url, "https://a.com/fast");
        assert_eq!(stats.fastest.len(), 3);
        assert_eq!(stats.largest[0].size, 4096);
        assert_eq!(stats.largest.len(), 2);
    }

    #[test]
    fn test_rankings_are_capped() {
        let records: Vec<_> = (0..25)
            .map(|i| rec("https://a.com/x", 200, i as f64 + 1.0, "2024-01-01T10:00:00.000Z"))
            .collect();
        let stats = compute_stats(&records);
        assert_eq!(stats.slowest.len(), TOP_N);
        assert_eq!(stats.slowest[0].duration, 25.0);
        assert_eq!(stats.fastest[0].duration, 1.0);
    }

    #[test]
    fn test_status_group_boundaries() {
        assert_eq!(StatusGroup::of(Some(0)), StatusGroup::Other);
        assert_eq!(StatusGroup::of(Some(299)), StatusGroup::Success);
        assert_eq!(StatusGroup::of(Some(600)), StatusGroup::Other);
        assert_eq!(StatusGroup::of(None), StatusGroup::Other);
    }

    #[test]
    fn test_text_report() {
        let records = vec![rec("https://a.com/1", 500, 12.0, "2024-01-01T10:00:00.000Z")];
        let report = compute_stats(&records).text_report();
        assert!(report.contains("Total Requests: 1"));
        assert!(report.contains("Errors: 1 (100.0%)"));
        assert!(report.contains("  a.com: 1"));
        assert!(report.contains("1. GET https://a.com/1 - 12ms"));
    }
}
