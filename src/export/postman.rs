// src/export/postman.rs
//! Postman collection v2.1 export

use crate::recording::record::{BodyPreview, CaptureRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const COLLECTION_NAME: &str = "API Sniffer Export";
pub const COLLECTION_SCHEMA: &str =
    "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub info: CollectionInfo,
    pub item: Vec<CollectionItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub schema: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionItem {
    pub name: String,
    pub request: ItemRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRequest {
    pub method: String,
    pub header: Vec<KeyValue>,
    pub url: ItemUrl,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ItemBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Decomposed URL, or the raw string when it does not parse
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemUrl {
    Parts {
        raw: String,
        protocol: String,
        host: Vec<String>,
        path: Vec<String>,
        query: Vec<KeyValue>,
    },
    Raw(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemBody {
    pub mode: String,
    pub raw: String,
    pub options: serde_json::Value,
}

fn raw_body(body: &BodyPreview) -> ItemBody {
    let raw = match body {
        BodyPreview::Json { value } => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.as_text(),
    };
    ItemBody {
        mode: "raw".to_string(),
        raw,
        options: serde_json::json!({ "raw": { "language": "json" } }),
    }
}

impl CollectionItem {
    pub fn from_record(record: &CaptureRecord) -> Self {
        let method = record.method.clone().unwrap_or_else(|| "GET".to_string());

        let parsed = match url::Url::parse(&record.url) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Minimal collection item for unparsable URL {:?}: {}", record.url, e);
                return CollectionItem {
                    name: format!("{} {}", method, record.url),
                    request: ItemRequest {
                        method,
                        header: Vec::new(),
                        url: ItemUrl::Raw(record.url.clone()),
                        body: None,
                    },
                };
            }
        };

        let url = ItemUrl::Parts {
            raw: record.url.clone(),
            protocol: parsed.scheme().to_string(),
            host: parsed
                .host_str()
                .map(|host| host.split('.').map(str::to_string).collect())
                .unwrap_or_default(),
            path: parsed
                .path()
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
            query: parsed
                .query_pairs()
                .map(|(key, value)| KeyValue {
                    key: key.into_owned(),
                    value: value.into_owned(),
                })
                .collect(),
        };

        CollectionItem {
            name: format!("{} {}", method, parsed.path()),
            request: ItemRequest {
                method,
                header: record
                    .request_headers
                    .iter()
                    .map(|(key, value)| KeyValue {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect(),
                url,
                body: record.request_body.as_ref().map(raw_body),
            },
        }
    }
}

/// Build the collection for `records`, one item per record
pub fn build_collection(records: &[CaptureRecord]) -> Collection {
    Collection {
        info: CollectionInfo {
            name: COLLECTION_NAME.to_string(),
            schema: COLLECTION_SCHEMA.to_string(),
        },
        item: records.iter().map(CollectionItem::from_record).collect(),
    }
}
