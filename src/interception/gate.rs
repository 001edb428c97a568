// src/interception/gate.rs
//! Page-local recording gate and capture emission
//!
//! The gate is a cached, read-only copy of the authority's flags. While it is
//! closed an instrumented surface costs a single atomic load per call.

use crate::observability::{CAPTURES_DROPPED, CAPTURES_EMITTED};
use crate::recording::record::CaptureRecord;
use crate::recording::recorder::RuntimeState;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Cached recording flags of one page
#[derive(Debug, Default)]
pub struct CaptureGate {
    recording: AtomicBool,
    paused: AtomicBool,
}

impl CaptureGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a state push from the mediator
    pub fn apply(&self, state: RuntimeState) {
        self.recording.store(state.recording, Ordering::Release);
        self.paused.store(state.paused, Ordering::Release);
    }

    pub fn state(&self) -> RuntimeState {
        RuntimeState {
            recording: self.recording.load(Ordering::Acquire),
            paused: self.paused.load(Ordering::Acquire),
        }
    }

    /// Recording and not paused
    pub fn is_open(&self) -> bool {
        self.state().is_capturing()
    }
}

/// Destination of built records, usually the page bus
pub trait CaptureSink: Send + Sync {
    /// Hand over a record; `false` when nobody received it
    fn submit(&self, record: CaptureRecord) -> bool;
}

/// Gate-checked, panic-safe record emission shared by all decorators
#[derive(Clone)]
pub struct CaptureEmitter {
    gate: Arc<CaptureGate>,
    sink: Arc<dyn CaptureSink>,
}

impl CaptureEmitter {
    pub fn new(gate: Arc<CaptureGate>, sink: Arc<dyn CaptureSink>) -> Self {
        Self { gate, sink }
    }

    /// Build and submit a record if the gate is open
    ///
    /// `build` only runs when the gate is open. A panic while building is
    /// caught and the record discarded; it never reaches the caller of the
    /// instrumented surface.
    pub fn emit_with<F>(&self, build: F) -> bool
    where
        F: FnOnce() -> CaptureRecord,
    {
        if !self.gate.is_open() {
            return false;
        }

        let record = match catch_unwind(AssertUnwindSafe(build)) {
            Ok(record) => record,
            Err(_) => {
                metrics::counter!(CAPTURES_DROPPED).increment(1);
                debug!("Capture record construction panicked, discarded");
                return false;
            }
        };

        let api_type = record.api_type;
        if self.sink.submit(record) {
            metrics::counter!(CAPTURES_EMITTED).increment(1);
            true
        } else {
            metrics::counter!(CAPTURES_DROPPED).increment(1);
            debug!("No listener for {} capture", api_type);
            false
        }
    }
}
