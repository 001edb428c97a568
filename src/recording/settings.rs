// src/recording/settings.rs
//! Capture settings
//!
//! Settings arrive as loosely-typed JSON (from storage or from an
//! `update_settings` request) and are merged over [`Settings::default`]
//! before being deserialized:
//!
//! - object keys from the custom value override the defaults
//! - nested objects merge recursively
//! - arrays and scalars replace wholesale
//! - `null` leaves the default in place

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Glob patterns for URLs that are never recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IgnoreList {
    pub enabled: bool,
    pub patterns: Vec<String>,
}

/// Optional allow-list applied before a record is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordingConditions {
    pub enabled: bool,
    pub url_patterns: Vec<String>,
    pub domains: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

/// Periodic trimming of the log store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoCleanup {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub max_records: usize,
}

/// Header redaction and cleanup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Security {
    pub hide_tokens: bool,

    /// Case-insensitive substrings of header names whose values are hidden
    pub token_patterns: Vec<String>,

    pub auto_cleanup: AutoCleanup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Performance {
    /// Log store cap
    pub max_logs: usize,
}

/// Complete settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub ignore_list: IgnoreList,
    pub recording_conditions: RecordingConditions,
    pub security: Security,
    pub performance: Performance,
}

impl Default for IgnoreList {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: [
                "*/analytics/*",
                "*/google-analytics.com/*",
                "*/googletagmanager.com/*",
                "*/facebook.com/tr/*",
                "*/doubleclick.net/*",
                "*/ads/*",
                "*/tracking/*",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

impl Default for RecordingConditions {
    fn default() -> Self {
        Self {
            enabled: false,
            url_patterns: Vec::new(),
            domains: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for AutoCleanup {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 30,
            max_records: 1000,
        }
    }
}

impl Default for Security {
    fn default() -> Self {
        Self {
            hide_tokens: true,
            token_patterns: [
                "authorization",
                "x-auth-token",
                "x-api-key",
                "bearer",
                "token",
                "api-key",
                "apikey",
                "password",
                "secret",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            auto_cleanup: AutoCleanup::default(),
        }
    }
}

impl Default for Performance {
    fn default() -> Self {
        Self { max_logs: 5000 }
    }
}

impl Settings {
    /// Merge `custom` over the defaults and deserialize the result
    pub fn from_custom(custom: &Value) -> serde_json::Result<Self> {
        let defaults = serde_json::to_value(Settings::default())?;
        serde_json::from_value(merge_values(defaults, custom))
    }

    /// Effective log cap; a zero cap is treated as one
    pub fn log_cap(&self) -> usize {
        self.performance.max_logs.max(1)
    }
}

/// Recursive key-by-key merge of `custom` over `base`
pub fn merge_values(base: Value, custom: &Value) -> Value {
    match (base, custom) {
        (Value::Object(mut base_map), Value::Object(custom_map)) => {
            for (key, custom_value) in custom_map {
                if custom_value.is_null() {
                    continue;
                }
                let merged = if custom_value.is_object() {
                    let base_value = base_map
                        .remove(key)
                        .unwrap_or_else(|| Value::Object(Default::default()));
                    merge_values(base_value, custom_value)
                } else {
                    custom_value.clone()
                };
                base_map.insert(key.clone(), merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, custom) => custom.clone(),
    }
}

/// Compile a `*` glob into an unanchored regex; other characters match literally
pub fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    match Regex::new(&body) {
        Ok(regex) => Some(regex),
        Err(e) => {
            debug!("Skipping invalid URL pattern {:?}: {}", pattern, e);
            None
        }
    }
}

fn compile_all(patterns: &[String]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
}

/// Compiled form of the ignore list and recording conditions
#[derive(Debug, Clone, Default)]
pub struct UrlRules {
    ignore_enabled: bool,
    ignore: Vec<Regex>,
    conditions_enabled: bool,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    domains: Vec<String>,
}

impl UrlRules {
    pub fn compile(settings: &Settings) -> Self {
        let conditions = &settings.recording_conditions;
        Self {
            ignore_enabled: settings.ignore_list.enabled,
            ignore: compile_all(&settings.ignore_list.patterns),
            conditions_enabled: conditions.enabled,
            include: compile_all(&conditions.url_patterns),
            exclude: compile_all(&conditions.exclude_patterns),
            domains: conditions.domains.clone(),
        }
    }

    /// Whether the ignore list drops `url`
    pub fn is_ignored(&self, url: &str) -> bool {
        self.ignore_enabled && self.ignore.iter().any(|r| r.is_match(url))
    }

    /// Whether the recording conditions admit `url`
    pub fn should_record(&self, url: &str) -> bool {
        if !self.conditions_enabled {
            return true;
        }
        if self.exclude.iter().any(|r| r.is_match(url)) {
            return false;
        }
        if !self.include.is_empty() {
            return self.include.iter().any(|r| r.is_match(url));
        }
        if !self.domains.is_empty() {
            return match url::Url::parse(url) {
                Ok(parsed) => {
                    let host = parsed.host_str().unwrap_or_default();
                    self.domains.iter().any(|d| host.contains(d.as_str()))
                }
                Err(_) => false,
            };
        }
        true
    }

    /// Combined admission check used by the event store
    pub fn admits(&self, url: &str) -> bool {
        !self.is_ignored(url) && self.should_record(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.ignore_list.enabled);
        assert!(settings.security.hide_tokens);
        assert_eq!(settings.performance.max_logs, 5000);
        assert_eq!(settings.security.auto_cleanup.interval_minutes, 30);
    }

    #[test]
    fn test_merge_nested_objects_and_replace_arrays() {
        let settings = Settings::from_custom(&json!({
            "performance": { "maxLogs": 2 },
            "ignoreList": { "patterns": ["*/x/*"] },
            "security": { "autoCleanup": { "enabled": true } }
        }))
        .unwrap();

        assert_eq!(settings.performance.max_logs, 2);
        assert_eq!(settings.ignore_list.patterns, vec!["*/x/*".to_string()]);
        assert!(settings.ignore_list.enabled);
        assert!(settings.security.auto_cleanup.enabled);
        assert_eq!(settings.security.auto_cleanup.max_records, 1000);
        assert!(settings.security.hide_tokens);
    }

    #[test]
    fn test_null_keeps_default() {
        let settings = Settings::from_custom(&json!({ "performance": null })).unwrap();
        assert_eq!(settings.performance.max_logs, 5000);
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        assert!(Settings::from_custom(&json!({ "performance": { "maxLogs": "lots" } })).is_err());
    }

    #[test]
    fn test_glob_matching() {
        let regex = glob_to_regex("*/analytics/*").unwrap();
        assert!(regex.is_match("https://site.com/analytics/collect"));
        assert!(!regex.is_match("https://site.com/api/users"));

        // dots are literal
        let regex = glob_to_regex("*/doubleclick.net/*").unwrap();
        assert!(!regex.is_match("https://doubleclickxnet/a"));
    }

    #[test]
    fn test_ignore_list() {
        let rules = UrlRules::compile(&Settings::default());
        assert!(rules.is_ignored("https://x.com/ads/banner"));
        assert!(!rules.is_ignored("https://x.com/api/v1"));

        let mut settings = Settings::default();
        settings.ignore_list.enabled = false;
        assert!(!UrlRules::compile(&settings).is_ignored("https://x.com/ads/banner"));
    }

    #[test]
    fn test_recording_conditions() {
        let mut settings = Settings::default();
        settings.recording_conditions = RecordingConditions {
            enabled: true,
            url_patterns: vec![],
            domains: vec!["example.com".into()],
            exclude_patterns: vec!["*/health*".into()],
        };
        let rules = UrlRules::compile(&settings);

        assert!(rules.should_record("https://api.example.com/users"));
        assert!(!rules.should_record("https://api.example.com/health"));
        assert!(!rules.should_record("https://other.org/users"));
        assert!(!rules.should_record("not a url"));

        settings.recording_conditions.url_patterns = vec!["*/v2/*".into()];
        let rules = UrlRules::compile(&settings);
        assert!(rules.should_record("https://other.org/v2/items"));
        assert!(!rules.should_record("https://api.example.com/v1/items"));
    }

    #[test]
    fn test_log_cap_never_zero() {
        let mut settings = Settings::default();
        settings.performance.max_logs = 0;
        assert_eq!(settings.log_cap(), 1);
    }
}
