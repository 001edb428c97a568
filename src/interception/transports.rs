// src/interception/transports.rs
//! Pass-through platform surfaces
//!
//! fetch, xhr and event-source go through a hyper-util client; sockets
//! through tokio-tungstenite. None of these capture anything themselves.

use crate::interception::surfaces::{
    DuplexSocket, EventSourceConnector, EventStream, FetchIssuer, HttpRequest, HttpResponse,
    SocketConnector, SocketEvent, SocketFrame, StreamEvent, Surfaces, TransportError, XhrCallback,
    XhrOutcome, XhrTransport,
};
use crate::recording::record::CloseInfo;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type HttpClient = Client<HttpConnector, Full<Bytes>>;

fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Attach the body bytes and the content type implied by the body kind
fn into_wire(request: HttpRequest) -> hyper::Request<Full<Bytes>> {
    let (mut parts, body) = request.into_parts();
    let bytes = match body {
        Some(body) => {
            let (bytes, content_type) = body.encode();
            if let Some(content_type) = content_type {
                if !parts.headers.contains_key(CONTENT_TYPE) {
                    parts
                        .headers
                        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                }
            }
            bytes
        }
        None => Bytes::new(),
    };
    hyper::Request::from_parts(parts, Full::new(bytes))
}

/// fetch over hyper
#[derive(Clone)]
pub struct HyperFetch {
    client: HttpClient,
}

impl HyperFetch {
    pub fn new() -> Self {
        Self {
            client: build_client(),
        }
    }
}

impl Default for HyperFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchIssuer for HyperFetch {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .request(into_wire(request))
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TransportError::Network(format!("Response body error: {}", e)))?
            .to_bytes();

        Ok(hyper::Response::from_parts(parts, body))
    }
}

/// Render headers the way xhr-style transports expose them
fn raw_header_block(headers: &hyper::HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes())))
        .collect()
}

/// xhr over the fetch transport, completing on a spawned task
#[derive(Clone, Default)]
pub struct HyperXhr {
    fetch: HyperFetch,
}

impl HyperXhr {
    pub fn new(fetch: HyperFetch) -> Self {
        Self { fetch }
    }
}

impl XhrTransport for HyperXhr {
    fn send(&self, request: HttpRequest, on_loadend: XhrCallback) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("xhr send outside a runtime, reporting network failure");
            on_loadend(XhrOutcome::default());
            return;
        };

        let fetch = self.fetch.clone();
        runtime.spawn(async move {
            let outcome = match fetch.fetch(request).await {
                Ok(response) => XhrOutcome {
                    status: response.status().as_u16(),
                    status_text: response
                        .status()
                        .canonical_reason()
                        .unwrap_or_default()
                        .to_string(),
                    response_headers: raw_header_block(response.headers()),
                    response_text: String::from_utf8_lossy(response.body()).into_owned(),
                },
                Err(e) => {
                    debug!("xhr failed: {}", e);
                    XhrOutcome::default()
                }
            };
            on_loadend(outcome);
        });
    }
}

/// Socket connector over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(
        &self,
        url: &str,
        protocols: &[String],
    ) -> Result<Box<dyn DuplexSocket>, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        if !protocols.is_empty() {
            let value = HeaderValue::from_str(&protocols.join(", "))
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        debug!("Socket connected to {}", url);
        Ok(Box::new(TungsteniteSocket { stream }))
    }
}

struct TungsteniteSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl DuplexSocket for TungsteniteSocket {
    async fn send(&mut self, frame: SocketFrame) -> Result<(), TransportError> {
        let message = match frame {
            SocketFrame::Text(text) => Message::Text(text.into()),
            SocketFrame::Binary(bytes) => Message::Binary(bytes.to_vec().into()),
        };
        self.stream
            .send(message)
            .await
            .map_err(|e| TransportError::Network(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<SocketEvent, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None
                }
                Err(e) => return Some(Err(TransportError::Network(e.to_string()))),
            };

            match message {
                Message::Text(text) => {
                    return Some(Ok(SocketEvent::Message(SocketFrame::Text(text.to_string()))))
                }
                Message::Binary(data) => {
                    return Some(Ok(SocketEvent::Message(SocketFrame::Binary(Bytes::from(data)))))
                }
                Message::Close(frame) => {
                    let info = match frame {
                        Some(frame) => CloseInfo {
                            code: u16::from(frame.code),
                            reason: frame.reason.to_string(),
                            was_clean: true,
                        },
                        None => CloseInfo {
                            code: 1005,
                            reason: String::new(),
                            was_clean: true,
                        },
                    };
                    return Some(Ok(SocketEvent::Close(info)));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| TransportError::Network(e.to_string()))
    }
}

/// Incremental `text/event-stream` parser
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
}

impl SseParser {
    /// Feed a chunk and collect every event it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&*line);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(StreamEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id: self.last_id.clone(),
        })
    }
}

/// Event-source connector over hyper
#[derive(Clone, Default)]
pub struct HttpEventSource {
    fetch: HyperFetch,
}

impl HttpEventSource {
    pub fn new(fetch: HyperFetch) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl EventSourceConnector for HttpEventSource {
    async fn open(&self, url: &str) -> Result<Box<dyn EventStream>, TransportError> {
        let request = hyper::Request::get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .body(Full::new(Bytes::new()))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let response = self
            .fetch
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Network(format!(
                "Event stream responded with {}",
                response.status()
            )));
        }

        Ok(Box::new(HttpEventStream {
            body: response.into_body(),
            parser: SseParser::default(),
            pending: VecDeque::new(),
            done: false,
        }))
    }
}

struct HttpEventStream {
    body: Incoming,
    parser: SseParser,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

#[async_trait]
impl EventStream for HttpEventStream {
    async fn next_event(&mut self) -> Option<Result<StreamEvent, TransportError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }

            match self.body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.pending.extend(self.parser.push(&data));
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(TransportError::Network(e.to_string())));
                }
                None => self.done = true,
            }
        }
    }
}

impl Surfaces {
    /// Pass-through surfaces backed by the network
    pub fn platform() -> Self {
        let fetch = HyperFetch::new();
        Self {
            fetch: Arc::new(fetch.clone()),
            xhr: Arc::new(HyperXhr::new(fetch.clone())),
            socket: Arc::new(TungsteniteConnector),
            event_source: Arc::new(HttpEventSource::new(fetch)),
        }
    }
}
