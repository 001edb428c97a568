// src/export/har.rs
//! HAR 1.2 trace documents
//!
//! One entry per record. Records that never carried an HTTP exchange (socket
//! and stream events) still produce an entry so the document mirrors the log.

use crate::recording::record::{BodyPreview, CaptureRecord, HeaderMap};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const HAR_VERSION: &str = "1.2";
pub const CREATOR_NAME: &str = "API Sniffer";

const DEFAULT_MIME_TYPE: &str = "application/json";
const HTTP_VERSION: &str = "HTTP/1.1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarDocument {
    pub log: HarLog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarLog {
    pub version: String,
    pub creator: HarCreator,
    pub entries: Vec<HarEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarCreator {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
    pub started_date_time: String,
    pub time: f64,
    pub request: HarRequest,
    pub response: HarResponse,
    pub cache: HarCache,
    pub timings: HarTimings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub headers: Vec<HarNameValue>,
    pub query_string: Vec<HarNameValue>,
    pub cookies: Vec<HarNameValue>,
    pub headers_size: i64,
    pub body_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<HarPostData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    pub status: u16,
    pub status_text: String,
    pub http_version: String,
    pub headers: Vec<HarNameValue>,
    pub cookies: Vec<HarNameValue>,
    pub content: HarContent,
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    pub headers_size: i64,
    pub body_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarNameValue {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPostData {
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
    pub size: i64,
    pub mime_type: String,
    pub text: String,
}

/// Always empty, kept for schema conformance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarCache {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarTimings {
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
}

fn header_list(headers: &HeaderMap) -> Vec<HarNameValue> {
    headers
        .iter()
        .map(|(name, value)| HarNameValue {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

fn query_list(raw_url: &str) -> Vec<HarNameValue> {
    match url::Url::parse(raw_url) {
        Ok(parsed) => parsed
            .query_pairs()
            .map(|(name, value)| HarNameValue {
                name: name.into_owned(),
                value: value.into_owned(),
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn mime_type_of(headers: &HeaderMap) -> String {
    headers
        .get("content-type")
        .cloned()
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

impl HarEntry {
    pub fn from_record(record: &CaptureRecord) -> Self {
        // Invalid or missing timestamps fall back to the export instant
        let started = record.parsed_timestamp().unwrap_or_else(Utc::now);
        let time = record.duration.unwrap_or(0.0);

        let post_data = record.request_body.as_ref().map(|body| HarPostData {
            mime_type: mime_type_of(&record.request_headers),
            text: body.as_text(),
        });

        let content = HarContent {
            size: record
                .response_size()
                .map(|size| size as i64)
                .unwrap_or(-1),
            mime_type: mime_type_of(&record.response_headers),
            text: record
                .response_body
                .as_ref()
                .map(BodyPreview::as_text)
                .unwrap_or_default(),
        };

        HarEntry {
            started_date_time: started.to_rfc3339_opts(SecondsFormat::Millis, true),
            time,
            request: HarRequest {
                method: record.method.clone().unwrap_or_else(|| "GET".to_string()),
                url: record.url.clone(),
                http_version: HTTP_VERSION.to_string(),
                headers: header_list(&record.request_headers),
                query_string: query_list(&record.url),
                cookies: Vec::new(),
                headers_size: -1,
                body_size: -1,
                post_data,
            },
            response: HarResponse {
                status: record.status.unwrap_or(0),
                status_text: record.status_text.clone().unwrap_or_default(),
                http_version: HTTP_VERSION.to_string(),
                headers: header_list(&record.response_headers),
                cookies: Vec::new(),
                content,
                redirect_url: String::new(),
                headers_size: -1,
                body_size: -1,
            },
            cache: HarCache::default(),
            timings: HarTimings {
                send: 0.0,
                wait: time,
                receive: 0.0,
            },
        }
    }
}

/// Build the HAR document for `records`
pub fn build_har(records: &[CaptureRecord]) -> HarDocument {
    HarDocument {
        log: HarLog {
            version: HAR_VERSION.to_string(),
            creator: HarCreator {
                name: CREATOR_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            entries: records.iter().map(HarEntry::from_record).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::record::ApiType;
    use serde_json::json;

    #[test]
    fn test_entry_shape() {
        let mut record = CaptureRecord::new(ApiType::Fetch, "https://a/b?x=1&y=two")
            .with_method("post")
            .with_status(201)
            .with_duration(40.5)
            .with_timestamp("2024-05-01T10:00:00.000Z")
            .with_request_header("Content-Type", "application/json")
            .with_response_body(BodyPreview::Text {
                value: "done".into(),
            });
        record.request_body = Some(BodyPreview::Json {
            value: json!({"a": 1}),
        });

        let doc = build_har(&[record]);
        let value = serde_json::to_value(&doc).unwrap();
        let entry = &value["log"]["entries"][0];

        assert_eq!(value["log"]["version"], "1.2");
        assert_eq!(value["log"]["creator"]["name"], "API Sniffer");
        assert_eq!(entry["startedDateTime"], "2024-05-01T10:00:00.000Z");
        assert_eq!(entry["time"], 40.5);
        assert_eq!(entry["request"]["method"], "POST");
        assert_eq!(
            entry["request"]["queryString"],
            json!([{"name": "x", "value": "1"}, {"name": "y", "value": "two"}])
        );
        assert_eq!(entry["request"]["postData"]["text"], r#"{"a":1}"#);
        assert_eq!(entry["response"]["status"], 201);
        assert_eq!(entry["response"]["content"]["text"], "done");
        assert_eq!(entry["response"]["content"]["size"], 4);
        assert_eq!(entry["response"]["redirectURL"], "");
        assert_eq!(entry["cache"], json!({}));
        assert_eq!(entry["timings"], json!({"send": 0.0, "wait": 40.5, "receive": 0.0}));
    }

    #[test]
    fn test_invalid_timestamp_falls_back_to_now() {
        let record = CaptureRecord::new(ApiType::Xhr, "not a url").with_timestamp("yesterday");
        let before = Utc::now();
        let entry = HarEntry::from_record(&record);

        let started = chrono::DateTime::parse_from_rfc3339(&entry.started_date_time).unwrap();
        assert!(started.timestamp() >= before.timestamp());
        assert!(entry.request.query_string.is_empty());
        assert_eq!(entry.request.method, "GET");
        assert_eq!(entry.response.status, 0);
        assert!(entry.request.post_data.is_none());
    }

    #[test]
    fn test_no_post_data_key_without_body() {
        let doc = build_har(&[CaptureRecord::new(ApiType::Fetch, "https://a/b")]);
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value["log"]["entries"][0]["request"].get("postData").is_none());
        assert_eq!(value["log"]["entries"][0]["response"]["content"]["size"], -1);
    }
}
