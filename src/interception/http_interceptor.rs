// src/interception/http_interceptor.rs
//! Instrumented fetch and xhr surfaces
//!
//! Both decorators forward the request untouched and hand back exactly what
//! the inner surface produced. Capturing happens on the side. The request is
//! snapshotted on every call; the gate is consulted only when the call
//! completes, so a call in flight when recording starts is still captured.

use crate::interception::body::{response_preview, serialize_body};
use crate::interception::gate::CaptureEmitter;
use crate::interception::surfaces::{
    FetchIssuer, HttpRequest, HttpResponse, TransportError, XhrCallback, XhrOutcome, XhrTransport,
};
use crate::recording::record::{now_iso, ApiType, BodyPreview, CaptureRecord, HeaderMap};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Flatten hyper headers: lowercase names, repeated values joined by `, `
pub fn flatten_headers(headers: &hyper::HeaderMap) -> HeaderMap {
    let mut flat = HeaderMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        flat.entry(name.as_str().to_lowercase())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    flat
}

/// Parse a raw CRLF header block as returned by xhr-style transports
pub fn parse_raw_headers(raw: &str) -> HeaderMap {
    raw.trim()
        .split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(": ") {
            Some((name, value)) => (name.to_lowercase(), value.to_string()),
            None => (line.to_lowercase(), String::new()),
        })
        .collect()
}

/// Request side of a capture, taken before the inner call
struct RequestSnapshot {
    started: Instant,
    timestamp: String,
    method: String,
    url: String,
    headers: HeaderMap,
    body: Option<BodyPreview>,
}

impl RequestSnapshot {
    fn take(request: &HttpRequest) -> Self {
        Self {
            started: Instant::now(),
            timestamp: now_iso(),
            method: request.method().as_str().to_uppercase(),
            url: request.uri().to_string(),
            headers: flatten_headers(request.headers()),
            body: request.body().as_ref().map(serialize_body),
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn into_record(self, api_type: ApiType, duration: f64) -> CaptureRecord {
        let mut record = CaptureRecord::new(api_type, self.url)
            .with_method(self.method)
            .with_timestamp(self.timestamp)
            .with_duration(duration);
        record.request_headers = self.headers;
        record.request_body = self.body;
        record
    }
}

/// Fetch decorator
pub struct InstrumentedFetch {
    inner: Arc<dyn FetchIssuer>,
    emitter: CaptureEmitter,
}

impl InstrumentedFetch {
    pub fn new(inner: Arc<dyn FetchIssuer>, emitter: CaptureEmitter) -> Self {
        Self { inner, emitter }
    }
}

#[async_trait]
impl FetchIssuer for InstrumentedFetch {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let snapshot = RequestSnapshot::take(&request);
        let result = self.inner.fetch(request).await;
        let duration = snapshot.elapsed_ms();

        match &result {
            Ok(response) => {
                // Bytes clone, the caller still owns the full body
                let body = response.body().clone();
                self.emitter.emit_with(|| {
                    let mut record = snapshot.into_record(ApiType::Fetch, duration);
                    record.ok = Some(true);
                    record.status = Some(response.status().as_u16());
                    record.status_text = Some(
                        response
                            .status()
                            .canonical_reason()
                            .unwrap_or_default()
                            .to_string(),
                    );
                    record.response_headers = flatten_headers(response.headers());
                    record.response_body = response_preview(&body);
                    record
                });
            }
            Err(e) => {
                self.emitter.emit_with(|| {
                    let mut record = snapshot.into_record(ApiType::Fetch, duration);
                    record.ok = Some(false);
                    record.error = Some(e.to_string());
                    record.status = Some(0);
                    record.status_text = Some(String::new());
                    record
                });
            }
        }

        result
    }

    fn is_instrumented(&self) -> bool {
        true
    }
}

/// Xhr decorator
pub struct InstrumentedXhr {
    inner: Arc<dyn XhrTransport>,
    emitter: CaptureEmitter,
}

impl InstrumentedXhr {
    pub fn new(inner: Arc<dyn XhrTransport>, emitter: CaptureEmitter) -> Self {
        Self { inner, emitter }
    }
}

impl XhrTransport for InstrumentedXhr {
    fn send(&self, request: HttpRequest, on_loadend: XhrCallback) {
        let snapshot = RequestSnapshot::take(&request);
        let emitter = self.emitter.clone();

        let wrapped: XhrCallback = Box::new(move |outcome: XhrOutcome| {
            let duration = snapshot.elapsed_ms();
            emitter.emit_with(|| {
                let mut record = snapshot.into_record(ApiType::Xhr, duration);
                record.ok = Some(outcome.status != 0);
                record.status = Some(outcome.status);
                record.status_text = Some(outcome.status_text.clone());
                record.response_headers = parse_raw_headers(&outcome.response_headers);
                record.response_body = response_preview(outcome.response_text.as_bytes());
                record
            });
            on_loadend(outcome);
        });

        self.inner.send(request, wrapped);
    }

    fn is_instrumented(&self) -> bool {
        true
    }
}
