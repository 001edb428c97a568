// src/relay/protocol.rs
//! Relay message vocabulary
//!
//! Two wire shapes exist. The page bus carries untyped JSON values told apart
//! by boolean marker fields; the authority inbox carries [`Request`] values
//! tagged by `action`.

use crate::analytics::{LogFilters, LogStats};
use crate::recording::record::{CaptureRecord, ContextId};
use crate::recording::recorder::{RuntimeState, StateSnapshot};
use crate::recording::settings::Settings;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// Marker of a capture on the page bus
pub const CAPTURE_MARKER: &str = "__sniffer__";

/// Marker of a state request on the page bus
pub const REQUEST_STATE_MARKER: &str = "__sniffer_request_state__";

/// Marker of a state push on the page bus
pub const STATE_UPDATE_MARKER: &str = "__sniffer_state_update__";

/// Message understood on the page bus
#[derive(Debug, Clone, PartialEq)]
pub enum PageMessage {
    /// Interceptor output, page to mediator
    Capture(Box<CaptureRecord>),

    /// Page asks for the current flags
    RequestState,

    /// Mediator pushes the current flags
    StateUpdate(RuntimeState),
}

impl PageMessage {
    pub fn to_value(&self) -> Value {
        match self {
            PageMessage::Capture(record) => json!({
                CAPTURE_MARKER: true,
                "payload": record,
            }),
            PageMessage::RequestState => json!({ REQUEST_STATE_MARKER: true }),
            PageMessage::StateUpdate(state) => json!({
                STATE_UPDATE_MARKER: true,
                "recording": state.recording,
                "paused": state.paused,
            }),
        }
    }

    /// Recognise a bus value; anything unrelated yields `None`
    pub fn from_value(value: &Value) -> Option<Self> {
        let marked = |marker: &str| value.get(marker).and_then(Value::as_bool) == Some(true);

        if marked(CAPTURE_MARKER) {
            let record = serde_json::from_value(value.get("payload")?.clone()).ok()?;
            return Some(PageMessage::Capture(Box::new(record)));
        }
        if marked(REQUEST_STATE_MARKER) {
            return Some(PageMessage::RequestState);
        }
        if marked(STATE_UPDATE_MARKER) {
            return Some(PageMessage::StateUpdate(RuntimeState {
                recording: value.get("recording").and_then(Value::as_bool)?,
                paused: value.get("paused").and_then(Value::as_bool).unwrap_or(false),
            }));
        }
        None
    }
}

/// Authority inbox vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    ApiLog { payload: Box<CaptureRecord> },
    GetState,
    SetRecording { value: bool },
    SetPaused { paused: bool },
    GetLogs,
    ClearLogs,
    FilterLogs {
        #[serde(default)]
        filters: LogFilters,
    },
    GetStats,
    UpdateSettings { settings: Value },
    GetSettings,
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::ApiLog { .. } => "api_log",
            Request::GetState => "get_state",
            Request::SetRecording { .. } => "set_recording",
            Request::SetPaused { .. } => "set_paused",
            Request::GetLogs => "get_logs",
            Request::ClearLogs => "clear_logs",
            Request::FilterLogs { .. } => "filter_logs",
            Request::GetStats => "get_stats",
            Request::UpdateSettings { .. } => "update_settings",
            Request::GetSettings => "get_settings",
        }
    }
}

/// Reply shapes, one per request kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    State(StateSnapshot),
    Logs { logs: Vec<CaptureRecord> },
    Stats { stats: Box<LogStats> },
    Settings { settings: Box<Settings> },
    Ack { ok: bool },
}

/// A request in the authority inbox
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,

    /// Context the request came from
    pub sender: Option<ContextId>,

    /// Absent for fire-and-forget posts
    pub reply: Option<oneshot::Sender<Response>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::record::ApiType;

    #[test]
    fn test_page_capture_roundtrip() {
        let record = CaptureRecord::new(ApiType::Fetch, "https://a/b").with_status(201);
        let value = PageMessage::Capture(Box::new(record.clone())).to_value();
        assert_eq!(value[CAPTURE_MARKER], true);
        assert_eq!(
            PageMessage::from_value(&value),
            Some(PageMessage::Capture(Box::new(record)))
        );
    }

    #[test]
    fn test_page_state_update_shape() {
        let value = PageMessage::StateUpdate(RuntimeState {
            recording: true,
            paused: false,
        })
        .to_value();
        assert_eq!(
            value,
            json!({ "__sniffer_state_update__": true, "recording": true, "paused": false })
        );
    }

    #[test]
    fn test_unrelated_values_are_ignored() {
        assert_eq!(PageMessage::from_value(&json!({"type": "hello"})), None);
        assert_eq!(PageMessage::from_value(&json!("text")), None);
        assert_eq!(PageMessage::from_value(&json!({ CAPTURE_MARKER: "yes" })), None);
        assert_eq!(
            PageMessage::from_value(&json!({ CAPTURE_MARKER: true, "payload": 3 })),
            None
        );
        assert_eq!(
            PageMessage::from_value(&json!({ REQUEST_STATE_MARKER: true })),
            Some(PageMessage::RequestState)
        );
    }

    #[test]
    fn test_request_action_tags() {
        let req: Request =
            serde_json::from_value(json!({"action": "set_paused", "paused": true})).unwrap();
        assert_eq!(req, Request::SetPaused { paused: true });
        assert_eq!(req.action(), "set_paused");

        let req: Request = serde_json::from_value(json!({"action": "filter_logs"})).unwrap();
        assert_eq!(req.action(), "filter_logs");

        assert!(serde_json::from_value::<Request>(json!({"action": "reboot"})).is_err());
    }

    #[test]
    fn test_response_shapes() {
        let state = Response::State(StateSnapshot {
            recording: true,
            paused: false,
            count: 3,
        });
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"recording": true, "paused": false, "count": 3})
        );
        assert_eq!(
            serde_json::to_value(Response::Ack { ok: true }).unwrap(),
            json!({"ok": true})
        );
    }
}
