// src/recording/mod.rs
//! Capture records and the authoritative event store
//!
//! - **Record**: the `CaptureRecord` wire shape and body previews
//! - **Settings**: user settings, merge rules and URL admission rules
//! - **Redaction**: sensitive header hiding
//! - **Log Store**: bounded, insertion-ordered log
//! - **Storage**: named-blob persistence (SQLite or memory)
//! - **Recorder**: the event store owning flags, log and settings
//! - **Service**: the authority task serving the relay inbox
//!
//! # Architecture
//!
//! ```text
//! Relay Bridge → api_log → AuthorityService inbox (FIFO)
//!                                  ↓
//!                    EventStore: gate → rules → redact
//!                                  ↓
//!                     LogStore (evict oldest past cap)
//!                                  ↓
//!                     KeyValueStorage (write-through)
//! ```

pub mod log_store;
pub mod record;
pub mod recorder;
pub mod redaction;
pub mod service;
pub mod settings;
pub mod storage;

// Re-export commonly used types
pub use log_store::LogStore;
pub use record::{ApiType, BodyPreview, CaptureRecord, ChannelEvent, CloseInfo, ContextId};
pub use recorder::{AppendOutcome, EventStore, RuntimeState, StartMode, StateSnapshot};
pub use redaction::{Redactor, REDACTION_MARKER};
pub use service::{AuthorityHandle, AuthorityService};
pub use settings::{Settings, UrlRules};
pub use storage::{KeyValueStorage, MemoryStorage, SqliteStorage};
