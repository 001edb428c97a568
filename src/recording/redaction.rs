// src/recording/redaction.rs
//! Sensitive header redaction
//!
//! Runs inside the event store before a record is appended, so hidden values
//! never reach persisted storage or any export.

use crate::recording::record::{CaptureRecord, HeaderMap};

/// Replacement for sensitive header values
pub const REDACTION_MARKER: &str = "***HIDDEN***";

/// Lowercased patterns, prepared once per settings change
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    patterns: Vec<String>,
}

impl Redactor {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether a header with this name carries a secret
    pub fn is_sensitive(&self, header_name: &str) -> bool {
        let name = header_name.to_lowercase();
        self.patterns.iter().any(|p| name.contains(p.as_str()))
    }

    /// Replace sensitive values in place, returning how many were hidden
    pub fn redact_headers(&self, headers: &mut HeaderMap) -> usize {
        let mut hidden = 0;
        for (name, value) in headers.iter_mut() {
            if self.is_sensitive(name) {
                *value = REDACTION_MARKER.to_string();
                hidden += 1;
            }
        }
        hidden
    }

    /// Redact both header maps of a record
    pub fn redact_record(&self, record: &mut CaptureRecord) -> usize {
        self.redact_headers(&mut record.request_headers)
            + self.redact_headers(&mut record.response_headers)
    }
}
