// src/interception/body.rs
//! Request bodies and their previews

use crate::recording::record::{truncate_chars, BodyPreview, PREVIEW_LIMIT};
use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;

/// Body handed to a request surface
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),

    /// Raw bytes (blobs, buffers)
    Bytes(Bytes),

    /// Multipart form fields
    Form(Vec<(String, String)>),

    /// `application/x-www-form-urlencoded` parameters
    UrlEncoded(Vec<(String, String)>),

    /// Structured value
    Json(Value),
}

impl RequestBody {
    /// Wire bytes and the content type implied by the variant
    pub fn encode(&self) -> (Bytes, Option<&'static str>) {
        match self {
            RequestBody::Text(text) => (Bytes::from(text.clone()), Some("text/plain;charset=UTF-8")),
            RequestBody::Bytes(bytes) => (bytes.clone(), None),
            RequestBody::Form(fields) | RequestBody::UrlEncoded(fields) => (
                Bytes::from(encode_pairs(fields)),
                Some("application/x-www-form-urlencoded;charset=UTF-8"),
            ),
            RequestBody::Json(value) => (
                Bytes::from(value.to_string()),
                Some("application/json"),
            ),
        }
    }
}

fn encode_pairs(fields: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish()
}

/// Preview of a request body; total over every variant
pub fn serialize_body(body: &RequestBody) -> BodyPreview {
    match body {
        RequestBody::Text(text) => BodyPreview::Text {
            value: truncate_chars(text, PREVIEW_LIMIT),
        },
        RequestBody::Bytes(bytes) => BodyPreview::Binary {
            size: bytes.len() as u64,
        },
        RequestBody::Form(fields) => BodyPreview::FormData {
            // Later duplicates win, like building an object from form entries
            value: fields.iter().cloned().collect::<BTreeMap<_, _>>(),
        },
        RequestBody::UrlEncoded(fields) => BodyPreview::Text {
            value: truncate_chars(&encode_pairs(fields), PREVIEW_LIMIT),
        },
        RequestBody::Json(value) => json_preview(value),
    }
}

/// Structured preview, or its truncated text once it outgrows the preview limit
fn json_preview(value: &Value) -> BodyPreview {
    let text = value.to_string();
    if text.chars().count() > PREVIEW_LIMIT {
        BodyPreview::Opaque {
            value: truncate_chars(&text, PREVIEW_LIMIT),
        }
    } else {
        BodyPreview::Json {
            value: value.clone(),
        }
    }
}

/// Preview of a response payload: lossy UTF-8, truncated, `None` when empty
pub fn response_preview(bytes: &[u8]) -> Option<BodyPreview> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    Some(BodyPreview::Text {
        value: truncate_chars(&text, PREVIEW_LIMIT),
    })
}
