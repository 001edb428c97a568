// src/recording/recorder.rs
//! Authoritative event store
//!
//! Owns the runtime flags, the bounded log and the settings. Every mutation
//! is written through to storage. Storage faults never reach callers: reads
//! fall back to defaults and failed writes are logged and otherwise ignored
//! (the in-memory state stays authoritative).

use crate::observability::{LOG_STORE_SIZE, RECORDS_EVICTED, RECORDS_STORED};
use crate::recording::log_store::LogStore;
use crate::recording::record::{CaptureRecord, ContextId};
use crate::recording::redaction::Redactor;
use crate::recording::settings::{Settings, UrlRules};
use crate::recording::storage::{keys, KeyValueStorage};
use crate::utils::errors::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Recording flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeState {
    pub recording: bool,
    pub paused: bool,
}

impl RuntimeState {
    /// Whether appended records are accepted
    pub fn is_capturing(&self) -> bool {
        self.recording && !self.paused
    }
}

/// Reply to `get_state`, `set_recording` and `set_paused`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub recording: bool,
    pub paused: bool,
    pub count: usize,
}

impl StateSnapshot {
    pub fn runtime(&self) -> RuntimeState {
        RuntimeState {
            recording: self.recording,
            paused: self.paused,
        }
    }
}

/// How the authoritative context starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// First install or reinstall: reset everything to defaults
    Install,

    /// Restart after suspension: reload persisted state
    Resume,
}

/// Result of [`EventStore::append_log`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored; `evicted` older records were dropped to respect the cap
    Stored { evicted: usize },

    /// Recording is off or paused
    NotCapturing,

    /// Dropped by the ignore list or recording conditions
    Filtered,
}

/// Authoritative state of the capture pipeline
pub struct EventStore {
    storage: Arc<dyn KeyValueStorage>,
    state: RuntimeState,
    logs: LogStore,
    settings: Settings,
    rules: UrlRules,
    redactor: Redactor,
}

impl EventStore {
    /// Build the store according to `mode`
    pub async fn open(storage: Arc<dyn KeyValueStorage>, mode: StartMode) -> Self {
        match mode {
            StartMode::Install => Self::install(storage).await,
            StartMode::Resume => Self::resume(storage).await,
        }
    }

    /// Reset state, settings and logs to defaults and persist them
    pub async fn install(storage: Arc<dyn KeyValueStorage>) -> Self {
        let store = Self::with_parts(storage, RuntimeState::default(), Vec::new(), Settings::default());

        let settings = serde_json::to_value(&store.settings).unwrap_or(Value::Null);
        if let Err(e) = store
            .storage
            .set_many(vec![
                (keys::RECORDING, Value::Bool(false)),
                (keys::PAUSED, Value::Bool(false)),
                (keys::LOGS, Value::Array(Vec::new())),
                (keys::SETTINGS, settings),
            ])
            .await
        {
            warn!("Failed to persist install defaults: {}", e);
        }

        info!("Event store installed with default settings");
        store
    }

    /// Reload all persisted keys, substituting defaults for anything missing or unreadable
    pub async fn resume(storage: Arc<dyn KeyValueStorage>) -> Self {
        let recording = load_key::<bool>(storage.as_ref(), keys::RECORDING)
            .await
            .unwrap_or(false);
        let paused = load_key::<bool>(storage.as_ref(), keys::PAUSED)
            .await
            .unwrap_or(false);
        let logs = load_key::<Vec<CaptureRecord>>(storage.as_ref(), keys::LOGS)
            .await
            .unwrap_or_default();
        let settings = match load_key::<Value>(storage.as_ref(), keys::SETTINGS).await {
            Some(raw) => Settings::from_custom(&raw).unwrap_or_else(|e| {
                warn!("Persisted settings unusable, using defaults: {}", e);
                Settings::default()
            }),
            None => Settings::default(),
        };

        let store = Self::with_parts(storage, RuntimeState { recording, paused }, logs, settings);
        info!(
            "Event store resumed: recording={}, paused={}, logs={}",
            store.state.recording,
            store.state.paused,
            store.logs.len()
        );
        store
    }

    fn with_parts(
        storage: Arc<dyn KeyValueStorage>,
        state: RuntimeState,
        logs: Vec<CaptureRecord>,
        settings: Settings,
    ) -> Self {
        let logs = LogStore::from_records(logs, settings.log_cap());
        metrics::gauge!(LOG_STORE_SIZE).set(logs.len() as f64);
        Self {
            storage,
            state,
            logs,
            rules: UrlRules::compile(&settings),
            redactor: Redactor::new(&settings.security.token_patterns),
            settings,
        }
    }

    /// Current flags and record count
    pub fn state(&self) -> StateSnapshot {
        StateSnapshot {
            recording: self.state.recording,
            paused: self.state.paused,
            count: self.logs.len(),
        }
    }

    /// Set the recording flag; `paused` is left untouched
    pub async fn set_recording(&mut self, value: bool) -> StateSnapshot {
        self.state.recording = value;
        self.persist(keys::RECORDING, Value::Bool(value)).await;
        info!("Recording: {}", value);
        self.state()
    }

    /// Set the paused flag
    pub async fn set_paused(&mut self, value: bool) -> StateSnapshot {
        self.state.paused = value;
        self.persist(keys::PAUSED, Value::Bool(value)).await;
        info!("Paused: {}", value);
        self.state()
    }

    /// Redact, append and persist a record when capturing
    pub async fn append_log(
        &mut self,
        mut record: CaptureRecord,
        sender: Option<ContextId>,
    ) -> AppendOutcome {
        if !self.state.is_capturing() {
            debug!("Dropping {} record, recording off or paused", record.api_type);
            return AppendOutcome::NotCapturing;
        }

        if !self.rules.admits(&record.url) {
            debug!("Dropping record for filtered URL {}", record.url);
            return AppendOutcome::Filtered;
        }

        if self.settings.security.hide_tokens {
            self.redactor.redact_record(&mut record);
        }
        if sender.is_some() {
            record.tab_id = sender;
        }

        let evicted = self.logs.push(record);
        metrics::counter!(RECORDS_STORED).increment(1);
        if evicted > 0 {
            metrics::counter!(RECORDS_EVICTED).increment(evicted as u64);
        }

        self.persist_logs().await;
        debug!("Log saved, total: {}", self.logs.len());
        AppendOutcome::Stored { evicted }
    }

    /// Snapshot of every stored record
    pub fn logs(&self) -> Vec<CaptureRecord> {
        self.logs.snapshot()
    }

    pub fn log_store(&self) -> &LogStore {
        &self.logs
    }

    /// Remove every record
    pub async fn clear_logs(&mut self) {
        self.logs.clear();
        self.persist_logs().await;
        info!("Logs cleared");
    }

    /// Merge `custom` over the defaults and make it the active settings
    ///
    /// The log cap is applied immediately. On a malformed document the
    /// previous settings stay active and the error is returned.
    pub async fn update_settings(&mut self, custom: &Value) -> Result<()> {
        let settings = Settings::from_custom(custom)?;

        self.rules = UrlRules::compile(&settings);
        self.redactor = Redactor::new(&settings.security.token_patterns);
        let evicted = self.logs.set_cap(settings.log_cap());
        self.settings = settings;

        let value = serde_json::to_value(&self.settings)?;
        self.persist(keys::SETTINGS, value).await;
        if evicted > 0 {
            metrics::counter!(RECORDS_EVICTED).increment(evicted as u64);
            self.persist_logs().await;
        }

        info!("Settings updated");
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Trim the log to `security.autoCleanup.maxRecords`, returning the number removed
    pub async fn auto_cleanup(&mut self) -> usize {
        let max_records = self.settings.security.auto_cleanup.max_records;
        let removed = self.logs.trim_to(max_records);
        if removed > 0 {
            metrics::counter!(RECORDS_EVICTED).increment(removed as u64);
            self.persist_logs().await;
            info!("Auto-cleanup: trimmed to {} records", max_records);
        }
        removed
    }

    async fn persist_logs(&self) {
        metrics::gauge!(LOG_STORE_SIZE).set(self.logs.len() as f64);
        let records: Vec<&CaptureRecord> = self.logs.iter().collect();
        match serde_json::to_value(records) {
            Ok(value) => self.persist(keys::LOGS, value).await,
            Err(e) => warn!("Failed to encode logs: {}", e),
        }
    }

    async fn persist(&self, key: &str, value: Value) {
        if let Err(e) = self.storage.set(key, value).await {
            warn!("Best-effort write of {} failed: {}", key, e);
        }
    }
}

async fn load_key<T: DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Option<T> {
    match storage.get(key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Persisted {} unreadable, using default: {}", key, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to read {}, using default: {}", key, e);
            None
        }
    }
}
