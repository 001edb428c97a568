// src/interception/mod.rs
//! Request interception layer
//!
//! Wraps the request-issuing surfaces of a page without changing what they
//! return or how they fail:
//!
//! - **Surfaces**: capability traits for fetch, xhr, sockets and event streams
//! - **Transports**: pass-through platform implementations (hyper, tungstenite)
//! - **HTTP Interceptor**: instrumented fetch and xhr decorators
//! - **Socket Interceptor**: instrumented socket and event-stream decorators
//! - **Gate**: cached recording flags and panic-safe record emission
//! - **Body**: request body previews
//!
//! # Architecture
//!
//! ```text
//! Page code (unmodified)
//!     │
//!     ├─ fetch / xhr ──► Instrumented* ──► HyperFetch / HyperXhr
//!     ├─ socket ───────► Instrumented* ──► TungsteniteConnector
//!     └─ event source ─► Instrumented* ──► HttpEventSource
//!                             │
//!                      CaptureGate open? ──► CaptureSink (page bus)
//! ```

pub mod body;
pub mod gate;
pub mod http_interceptor;
pub mod socket_interceptor;
pub mod surfaces;
pub mod transports;

// Re-export commonly used types
pub use body::{serialize_body, RequestBody};
pub use gate::{CaptureEmitter, CaptureGate, CaptureSink};
pub use http_interceptor::{InstrumentedFetch, InstrumentedXhr};
pub use socket_interceptor::{InstrumentedEventSource, InstrumentedSocketConnector};
pub use surfaces::{
    DuplexSocket, EventSourceConnector, EventStream, FetchIssuer, HttpRequest, HttpResponse,
    SocketConnector, SocketEvent, SocketFrame, StreamEvent, Surfaces, TransportError, XhrCallback,
    XhrOutcome, XhrTransport,
};
pub use transports::{HttpEventSource, HyperFetch, HyperXhr, SseParser, TungsteniteConnector};
