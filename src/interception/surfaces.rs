// src/interception/surfaces.rs
//! Request-issuing surfaces of a page
//!
//! Each surface is a capability trait with a pass-through platform
//! implementation (see `transports`) and an instrumented decorator.

use crate::interception::body::RequestBody;
use crate::interception::gate::CaptureEmitter;
use crate::interception::http_interceptor::{InstrumentedFetch, InstrumentedXhr};
use crate::interception::socket_interceptor::{InstrumentedEventSource, InstrumentedSocketConnector};
use crate::recording::record::{truncate_chars, CloseInfo};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

/// Request handed to the fetch and xhr surfaces
pub type HttpRequest = hyper::Request<Option<RequestBody>>;

/// Fully buffered response
pub type HttpResponse = hyper::Response<Bytes>;

/// Failure reported by a surface to its caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Failed to fetch: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Connection closed")]
    Closed,
}

/// Promise-style single-shot request
#[async_trait]
pub trait FetchIssuer: Send + Sync {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Already wrapped by an instrumented decorator
    fn is_instrumented(&self) -> bool {
        false
    }
}

/// Completion of an xhr-style request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XhrOutcome {
    /// 0 on network failure
    pub status: u16,
    pub status_text: String,

    /// Raw header block, `name: value` lines separated by CRLF
    pub response_headers: String,
    pub response_text: String,
}

/// Invoked once when the request ends, successfully or not
pub type XhrCallback = Box<dyn FnOnce(XhrOutcome) + Send>;

/// Callback/event-style request
pub trait XhrTransport: Send + Sync {
    fn send(&self, request: HttpRequest, on_loadend: XhrCallback);

    fn is_instrumented(&self) -> bool {
        false
    }
}

/// Socket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    Text(String),
    Binary(Bytes),
}

impl SocketFrame {
    /// Printable preview of at most `limit` characters
    pub fn preview(&self, limit: usize) -> String {
        match self {
            SocketFrame::Text(text) => truncate_chars(text, limit),
            SocketFrame::Binary(bytes) => format!("[binary {} bytes]", bytes.len()),
        }
    }
}

/// Inbound socket event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Message(SocketFrame),
    Close(CloseInfo),
}

/// Open duplex socket
#[async_trait]
pub trait DuplexSocket: Send {
    async fn send(&mut self, frame: SocketFrame) -> Result<(), TransportError>;

    /// Next inbound event, `None` once the socket is finished
    async fn recv(&mut self) -> Option<Result<SocketEvent, TransportError>>;

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Persistent duplex socket factory
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        protocols: &[String],
    ) -> Result<Box<dyn DuplexSocket>, TransportError>;

    fn is_instrumented(&self) -> bool {
        false
    }
}

/// One server-push event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Event type, `message` unless the server named it
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Open server-push stream
#[async_trait]
pub trait EventStream: Send {
    /// Next event, `None` once the stream ended
    async fn next_event(&mut self) -> Option<Result<StreamEvent, TransportError>>;
}

/// Server-push stream factory
#[async_trait]
pub trait EventSourceConnector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn EventStream>, TransportError>;

    fn is_instrumented(&self) -> bool {
        false
    }
}

/// The four surfaces of a page
#[derive(Clone)]
pub struct Surfaces {
    pub fetch: Arc<dyn FetchIssuer>,
    pub xhr: Arc<dyn XhrTransport>,
    pub socket: Arc<dyn SocketConnector>,
    pub event_source: Arc<dyn EventSourceConnector>,
}

impl Surfaces {
    /// Wrap every surface that is not already instrumented
    pub fn instrument(self, emitter: &CaptureEmitter) -> Self {
        let fetch: Arc<dyn FetchIssuer> = if self.fetch.is_instrumented() {
            self.fetch
        } else {
            Arc::new(InstrumentedFetch::new(self.fetch, emitter.clone()))
        };
        let xhr: Arc<dyn XhrTransport> = if self.xhr.is_instrumented() {
            self.xhr
        } else {
            Arc::new(InstrumentedXhr::new(self.xhr, emitter.clone()))
        };
        let socket: Arc<dyn SocketConnector> = if self.socket.is_instrumented() {
            self.socket
        } else {
            Arc::new(InstrumentedSocketConnector::new(self.socket, emitter.clone()))
        };
        let event_source: Arc<dyn EventSourceConnector> = if self.event_source.is_instrumented() {
            self.event_source
        } else {
            Arc::new(InstrumentedEventSource::new(self.event_source, emitter.clone()))
        };

        Self {
            fetch,
            xhr,
            socket,
            event_source,
        }
    }

    pub fn is_instrumented(&self) -> bool {
        self.fetch.is_instrumented()
            && self.xhr.is_instrumented()
            && self.socket.is_instrumented()
            && self.event_source.is_instrumented()
    }
}

impl std::fmt::Debug for Surfaces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surfaces")
            .field("fetch_instrumented", &self.fetch.is_instrumented())
            .field("xhr_instrumented", &self.xhr.is_instrumented())
            .field("socket_instrumented", &self.socket.is_instrumented())
            .field("event_source_instrumented", &self.event_source.is_instrumented())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_preview() {
        assert_eq!(SocketFrame::Text("hello".into()).preview(3), "hel");
        assert_eq!(
            SocketFrame::Binary(Bytes::from_static(b"abcd")).preview(3),
            "[binary 4 bytes]"
        );
    }

    #[test]
    fn test_instrument_wraps_once() {
        let (_, _, emitter) = crate::interception::gate::tests::open_emitter();
        let surfaces = Surfaces::platform();
        assert!(!surfaces.is_instrumented());

        let once = surfaces.instrument(&emitter);
        assert!(once.is_instrumented());
        let fetch_ptr = Arc::as_ptr(&once.fetch) as *const ();

        let twice = once.instrument(&emitter);
        assert_eq!(Arc::as_ptr(&twice.fetch) as *const (), fetch_ptr);
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Network("connection refused".into());
        assert_eq!(err.to_string(), "Failed to fetch: connection refused");
    }
}
