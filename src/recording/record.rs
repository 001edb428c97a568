// src/recording/record.rs
//! Capture records
//!
//! A [`CaptureRecord`] is one observed network event. The same shape is used
//! on the page bus, in the authority inbox, in persisted storage and in the
//! raw JSON export, so field names follow the camelCase wire format.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of characters kept from any body, frame or message
pub const PREVIEW_LIMIT: usize = 5000;

/// Maximum number of characters kept from an outbound socket frame
pub const SEND_PREVIEW_LIMIT: usize = 2000;

/// Lowercase header name to value
pub type HeaderMap = BTreeMap<String, String>;

/// Identifier of a page context (the owning tab)
pub type ContextId = u64;

/// Request surface a record was captured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// Promise-style single-shot request
    Fetch,

    /// Callback/event-style request
    Xhr,

    /// Persistent duplex socket
    #[serde(rename = "websocket")]
    WebSocket,

    /// Server-push event stream
    Sse,
}

impl ApiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::Fetch => "fetch",
            ApiType::Xhr => "xhr",
            ApiType::WebSocket => "websocket",
            ApiType::Sse => "sse",
        }
    }
}

impl std::fmt::Display for ApiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Socket and stream lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelEvent {
    Open,
    Send,
    Message,
    Close,
    Create,
    Error,
}

/// Socket close details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

/// Truncated, tagged preview of a request or response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BodyPreview {
    /// Text, truncated to [`PREVIEW_LIMIT`] characters
    Text { value: String },

    /// Binary payload, only its size is kept
    Binary { size: u64 },

    /// Form fields flattened to strings
    #[serde(rename = "formdata")]
    FormData { value: BTreeMap<String, String> },

    /// Structured value small enough to keep whole
    Json { value: serde_json::Value },

    /// Stringified and truncated to [`PREVIEW_LIMIT`] characters
    Opaque { value: String },
}

impl BodyPreview {
    /// Text rendering used by the HAR and Postman exporters
    pub fn as_text(&self) -> String {
        match self {
            BodyPreview::Text { value } | BodyPreview::Opaque { value } => value.clone(),
            BodyPreview::Json { value } => value.to_string(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }

    /// Size in bytes of the captured payload, when known
    pub fn size(&self) -> Option<u64> {
        match self {
            BodyPreview::Text { value } | BodyPreview::Opaque { value } => Some(value.len() as u64),
            BodyPreview::Binary { size } => Some(*size),
            BodyPreview::Json { value } => Some(value.to_string().len() as u64),
            BodyPreview::FormData { .. } => None,
        }
    }
}

/// Truncate `text` to at most `limit` characters (not bytes)
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Current instant formatted the way records carry it
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One observed network event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub api_type: ApiType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default)]
    pub url: String,

    /// `false` for calls that failed before a response was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,

    /// Stringified error of a failed call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: HeaderMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: HeaderMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<BodyPreview>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<BodyPreview>,

    /// Socket/stream lifecycle event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<ChannelEvent>,

    /// Frame or message preview for socket/stream events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<CloseInfo>,

    /// ISO-8601 instant assigned at call start
    #[serde(default)]
    pub timestamp: String,

    /// Milliseconds, present once the call completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<ContextId>,
}

impl CaptureRecord {
    /// Create an empty record for `api_type` and `url`, timestamped now
    pub fn new(api_type: ApiType, url: impl Into<String>) -> Self {
        Self {
            api_type,
            method: None,
            url: url.into(),
            ok: None,
            error: None,
            status: None,
            status_text: None,
            request_headers: HeaderMap::new(),
            response_headers: HeaderMap::new(),
            request_body: None,
            response_body: None,
            event: None,
            data: None,
            close: None,
            timestamp: now_iso(),
            duration: None,
            tab_id: None,
        }
    }

    pub fn with_method(mut self, method: impl AsRef<str>) -> Self {
        self.method = Some(method.as_ref().to_uppercase());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_event(mut self, event: ChannelEvent) -> Self {
        self.event = Some(event);
        self
    }

    pub fn with_request_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.request_headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn with_response_body(mut self, body: BodyPreview) -> Self {
        self.response_body = Some(body);
        self
    }

    /// Parsed timestamp, `None` when the stored string is not RFC 3339
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Response size used by the "largest responses" ranking
    pub fn response_size(&self) -> Option<u64> {
        self.response_body.as_ref().and_then(BodyPreview::size)
    }

    /// Host part of the URL, if it parses
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}
