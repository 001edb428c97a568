// src/analytics/filter.rs
//! Conjunctive log filtering
//!
//! Every criterion that is present narrows the result; absent or blank
//! criteria impose nothing. An invalid URL regex is treated as absent.

use crate::recording::record::{ApiType, CaptureRecord};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Status group selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,

    /// 2xx only
    Success,

    /// 4xx and 5xx
    Errors,
}

impl StatusFilter {
    pub fn admits(&self, status: Option<u16>) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Success => matches!(status, Some(200..=299)),
            StatusFilter::Errors => matches!(status, Some(400..=599)),
        }
    }
}

/// Filter criteria as sent with `filter_logs`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogFilters {
    pub api_types: Vec<ApiType>,
    pub methods: Vec<String>,
    pub status_codes: StatusFilter,
    pub url_pattern: Option<String>,
    pub search_query: Option<String>,
}

impl LogFilters {
    /// Prepare the filters for repeated matching
    pub fn compile(&self) -> CompiledFilters<'_> {
        let url_regex = non_blank(self.url_pattern.as_deref()).and_then(|pattern| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => Some(regex),
                Err(e) => {
                    debug!("Ignoring invalid URL filter {:?}: {}", pattern, e);
                    None
                }
            }
        });

        CompiledFilters {
            filters: self,
            url_regex,
            query: non_blank(self.search_query.as_deref()).map(str::to_lowercase),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Filters with the regex compiled and the search query lowercased
pub struct CompiledFilters<'a> {
    filters: &'a LogFilters,
    url_regex: Option<Regex>,
    query: Option<String>,
}

impl CompiledFilters<'_> {
    pub fn matches(&self, record: &CaptureRecord) -> bool {
        let filters = self.filters;

        if !filters.api_types.is_empty() && !filters.api_types.contains(&record.api_type) {
            return false;
        }

        if !filters.methods.is_empty() {
            let Some(method) = record.method.as_deref() else {
                return false;
            };
            if !filters.methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
                return false;
            }
        }

        if !filters.status_codes.admits(record.status) {
            return false;
        }

        if let Some(regex) = &self.url_regex {
            if !regex.is_match(&record.url) {
                return false;
            }
        }

        if let Some(query) = &self.query {
            let text = serde_json::to_string(record)
                .unwrap_or_default()
                .to_lowercase();
            if !text.contains(query.as_str()) {
                return false;
            }
        }

        true
    }
}

/// Records matching every present criterion, in their original order
pub fn filter_logs(records: &[CaptureRecord], filters: &LogFilters) -> Vec<CaptureRecord> {
    let compiled = filters.compile();
    records
        .iter()
        .filter(|record| compiled.matches(record))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<CaptureRecord> {
        vec![
            CaptureRecord::new(ApiType::Fetch, "https://api.example.com/users")
                .with_method("GET")
                .with_status(200),
            CaptureRecord::new(ApiType::Xhr, "https://api.example.com/login")
                .with_method("POST")
                .with_status(401),
            CaptureRecord::new(ApiType::Fetch, "https://cdn.example.com/app.js")
                .with_method("GET")
                .with_status(304),
            CaptureRecord::new(ApiType::WebSocket, "wss://live.example.com/feed"),
        ]
    }

    #[test]
    fn test_no_filters_returns_everything() {
        let logs = sample();
        assert_eq!(filter_logs(&logs, &LogFilters::default()).len(), 4);
    }

    #[test]
    fn test_api_type_and_method() {
        let logs = sample();
        let filters = LogFilters {
            api_types: vec![ApiType::Fetch],
            methods: vec!["get".into()],
            ..Default::default()
        };
        assert_eq!(filter_logs(&logs, &filters).len(), 2);
    }

    #[test]
    fn test_status_groups() {
        let logs = sample();
        let success = LogFilters {
            status_codes: StatusFilter::Success,
            ..Default::default()
        };
        let errors = LogFilters {
            status_codes: StatusFilter::Errors,
            ..Default::default()
        };
        assert_eq!(filter_logs(&logs, &success)[0].status, Some(200));
        assert_eq!(filter_logs(&logs, &success).len(), 1);
        assert_eq!(filter_logs(&logs, &errors)[0].status, Some(401));
    }

    #[test]
    fn test_error_group_stops_at_5xx() {
        assert!(StatusFilter::Errors.admits(Some(400)));
        assert!(StatusFilter::Errors.admits(Some(599)));
        assert!(!StatusFilter::Errors.admits(Some(600)));
        assert!(!StatusFilter::Errors.admits(Some(399)));
        assert!(!StatusFilter::Errors.admits(None));
    }

    #[test]
    fn test_url_regex_is_case_insensitive() {
        let logs = sample();
        let filters = LogFilters {
            url_pattern: Some("API\\.EXAMPLE".into()),
            ..Default::default()
        };
        assert_eq!(filter_logs(&logs, &filters).len(), 2);
    }

    #[test]
    fn test_invalid_regex_is_no_constraint() {
        let logs = sample();
        let filters = LogFilters {
            url_pattern: Some("([unclosed".into()),
            ..Default::default()
        };
        assert_eq!(filter_logs(&logs, &filters).len(), 4);
    }

    #[test]
    fn test_full_text_search() {
        let logs = sample();
        let filters = LogFilters {
            search_query: Some("LOGIN".into()),
            ..Default::default()
        };
        let result = filter_logs(&logs, &filters);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].method.as_deref(), Some("POST"));
    }

    #[test]
    fn test_blank_criteria_ignored() {
        let logs = sample();
        let filters = LogFilters {
            url_pattern: Some("   ".into()),
            search_query: Some("".into()),
            ..Default::default()
        };
        assert_eq!(filter_logs(&logs, &filters).len(), 4);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let logs = sample();
        let filters = LogFilters {
            methods: vec!["GET".into(), "POST".into()],
            url_pattern: Some("example".into()),
            ..Default::default()
        };
        let once = filter_logs(&logs, &filters);
        let twice = filter_logs(&once, &filters);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_wire_format() {
        let filters: LogFilters = serde_json::from_value(json!({
            "apiTypes": ["xhr", "websocket"],
            "statusCodes": "errors",
            "urlPattern": "login"
        }))
        .unwrap();
        assert_eq!(filters.api_types, vec![ApiType::Xhr, ApiType::WebSocket]);
        assert_eq!(filters.status_codes, StatusFilter::Errors);
        assert!(filters.methods.is_empty());
    }
}
