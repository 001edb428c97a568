// src/relay/mod.rs
//! Message relay between the page, mediating and authoritative contexts
//!
//! - **Protocol**: page bus markers and the authority request vocabulary
//! - **Channel**: liveness-checked delivery and the context registry
//! - **Page**: the page context (capture gate, surfaces, bus)
//! - **Bridge**: the mediating task attached to one page
//!
//! # Architecture
//!
//! ```text
//! Page (interceptors) ──bus──► RelayBridge ──api_log──► Authority
//!        ▲                         │  ▲                     │
//!        └──── state update ───────┘  └──── state push ─────┘
//! ```

pub mod bridge;
pub mod channel;
pub mod page;
pub mod protocol;

// Re-export commonly used types
pub use bridge::{BridgeHandle, RelayBridge};
pub use channel::{ContextRegistry, ContextSender, Delivery, PageBus};
pub use page::PageContext;
pub use protocol::{Envelope, PageMessage, Request, Response};
