// src/interception/socket_interceptor.rs
//! Instrumented socket and server-push surfaces
//!
//! Long-lived connections are always wrapped; the gate is consulted per
//! event, so a socket opened while paused is captured once recording resumes.

use crate::interception::gate::CaptureEmitter;
use crate::interception::surfaces::{
    DuplexSocket, EventSourceConnector, EventStream, SocketConnector, SocketEvent, SocketFrame,
    StreamEvent, TransportError,
};
use crate::recording::record::{
    truncate_chars, ApiType, CaptureRecord, ChannelEvent, PREVIEW_LIMIT, SEND_PREVIEW_LIMIT,
};
use async_trait::async_trait;
use std::sync::Arc;

fn channel_record(api_type: ApiType, url: &str, event: ChannelEvent) -> CaptureRecord {
    CaptureRecord::new(api_type, url).with_event(event)
}

fn error_record(api_type: ApiType, url: &str, error: &TransportError) -> CaptureRecord {
    let mut record = channel_record(api_type, url, ChannelEvent::Error);
    record.ok = Some(false);
    record.error = Some(error.to_string());
    record
}

/// Socket connector decorator
pub struct InstrumentedSocketConnector {
    inner: Arc<dyn SocketConnector>,
    emitter: CaptureEmitter,
}

impl InstrumentedSocketConnector {
    pub fn new(inner: Arc<dyn SocketConnector>, emitter: CaptureEmitter) -> Self {
        Self { inner, emitter }
    }
}

#[async_trait]
impl SocketConnector for InstrumentedSocketConnector {
    async fn connect(
        &self,
        url: &str,
        protocols: &[String],
    ) -> Result<Box<dyn DuplexSocket>, TransportError> {
        match self.inner.connect(url, protocols).await {
            Ok(socket) => {
                self.emitter
                    .emit_with(|| channel_record(ApiType::WebSocket, url, ChannelEvent::Open));
                Ok(Box::new(InstrumentedSocket {
                    inner: socket,
                    url: url.to_string(),
                    emitter: self.emitter.clone(),
                }))
            }
            Err(e) => {
                self.emitter
                    .emit_with(|| error_record(ApiType::WebSocket, url, &e));
                Err(e)
            }
        }
    }

    fn is_instrumented(&self) -> bool {
        true
    }
}

struct InstrumentedSocket {
    inner: Box<dyn DuplexSocket>,
    url: String,
    emitter: CaptureEmitter,
}

#[async_trait]
impl DuplexSocket for InstrumentedSocket {
    async fn send(&mut self, frame: SocketFrame) -> Result<(), TransportError> {
        self.emitter.emit_with(|| {
            let mut record = channel_record(ApiType::WebSocket, &self.url, ChannelEvent::Send);
            record.data = Some(frame.preview(SEND_PREVIEW_LIMIT));
            record
        });
        self.inner.send(frame).await
    }

    async fn recv(&mut self) -> Option<Result<SocketEvent, TransportError>> {
        let event = self.inner.recv().await;

        match &event {
            Some(Ok(SocketEvent::Message(frame))) => {
                self.emitter.emit_with(|| {
                    let mut record =
                        channel_record(ApiType::WebSocket, &self.url, ChannelEvent::Message);
                    record.data = Some(frame.preview(PREVIEW_LIMIT));
                    record
                });
            }
            Some(Ok(SocketEvent::Close(info))) => {
                self.emitter.emit_with(|| {
                    let mut record =
                        channel_record(ApiType::WebSocket, &self.url, ChannelEvent::Close);
                    record.close = Some(info.clone());
                    record
                });
            }
            Some(Err(e)) => {
                self.emitter
                    .emit_with(|| error_record(ApiType::WebSocket, &self.url, e));
            }
            None => {}
        }

        event
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.inner.close(code, reason).await
    }
}

/// Event-source connector decorator
pub struct InstrumentedEventSource {
    inner: Arc<dyn EventSourceConnector>,
    emitter: CaptureEmitter,
}

impl InstrumentedEventSource {
    pub fn new(inner: Arc<dyn EventSourceConnector>, emitter: CaptureEmitter) -> Self {
        Self { inner, emitter }
    }
}

#[async_trait]
impl EventSourceConnector for InstrumentedEventSource {
    async fn open(&self, url: &str) -> Result<Box<dyn EventStream>, TransportError> {
        self.emitter
            .emit_with(|| channel_record(ApiType::Sse, url, ChannelEvent::Create));

        match self.inner.open(url).await {
            Ok(stream) => Ok(Box::new(InstrumentedStream {
                inner: stream,
                url: url.to_string(),
                emitter: self.emitter.clone(),
            })),
            Err(e) => {
                self.emitter.emit_with(|| error_record(ApiType::Sse, url, &e));
                Err(e)
            }
        }
    }

    fn is_instrumented(&self) -> bool {
        true
    }
}

struct InstrumentedStream {
    inner: Box<dyn EventStream>,
    url: String,
    emitter: CaptureEmitter,
}

#[async_trait]
impl EventStream for InstrumentedStream {
    async fn next_event(&mut self) -> Option<Result<StreamEvent, TransportError>> {
        let event = self.inner.next_event().await;

        match &event {
            Some(Ok(stream_event)) => {
                self.emitter.emit_with(|| {
                    let mut record = channel_record(ApiType::Sse, &self.url, ChannelEvent::Message);
                    record.data = Some(truncate_chars(&stream_event.data, PREVIEW_LIMIT));
                    record
                });
            }
            Some(Err(e)) => {
                self.emitter.emit_with(|| error_record(ApiType::Sse, &self.url, e));
            }
            None => {}
        }

        event
    }
}
