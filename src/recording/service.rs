// src/recording/service.rs
//! Authoritative context
//!
//! A single task owns the [`EventStore`] and serves the inbox strictly in
//! arrival order. Other contexts reach it only through an [`AuthorityHandle`].
//! The periodic cleanup timer posts ticks into the same inbox, so the store
//! is never touched outside the service loop.

use crate::analytics::{compute_stats, filter_logs, LogFilters, LogStats};
use crate::recording::record::{CaptureRecord, ContextId};
use crate::recording::recorder::{AppendOutcome, EventStore, StartMode, StateSnapshot};
use crate::recording::settings::Settings;
use crate::recording::storage::KeyValueStorage;
use crate::relay::channel::{ContextRegistry, Delivery};
use crate::relay::protocol::{Envelope, Request, Response};
use crate::utils::errors::{EngineError, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Inbox item
#[derive(Debug)]
pub enum Inbound {
    Request(Envelope),

    /// Auto-cleanup timer fired
    CleanupTick,
}

/// The authority task
pub struct AuthorityService {
    store: EventStore,
    registry: Arc<ContextRegistry<StateSnapshot>>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    timer_tx: mpsc::WeakUnboundedSender<Inbound>,
    cleanup: Option<CancellationToken>,
    shutdown: CancellationToken,
}

impl AuthorityService {
    /// Start the authority
    ///
    /// The store is loaded according to `mode` inside the task before the
    /// first message is served; requests sent in the meantime queue up.
    pub fn spawn(storage: Arc<dyn KeyValueStorage>, mode: StartMode) -> AuthorityHandle {
        let (tx, inbox) = mpsc::unbounded_channel();
        let registry = Arc::new(ContextRegistry::new());
        let shutdown = CancellationToken::new();

        let timer_tx = tx.downgrade();
        let task_registry = registry.clone();
        let task_shutdown = shutdown.clone();

        tokio::spawn(async move {
            let store = EventStore::open(storage, mode).await;
            let service = AuthorityService {
                store,
                registry: task_registry,
                inbox,
                timer_tx,
                cleanup: None,
                shutdown: task_shutdown,
            };
            service.run().await;
        });

        AuthorityHandle {
            tx,
            registry,
            shutdown,
        }
    }

    async fn run(mut self) {
        info!("Authority started");
        self.restart_cleanup();

        loop {
            let inbound = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                message = self.inbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match inbound {
                Inbound::Request(envelope) => self.dispatch(envelope).await,
                Inbound::CleanupTick => {
                    self.store.auto_cleanup().await;
                }
            }
        }

        if let Some(token) = self.cleanup.take() {
            token.cancel();
        }
        self.registry.clear();
        info!("Authority stopped");
    }

    async fn dispatch(&mut self, envelope: Envelope) {
        let Envelope {
            request,
            sender,
            reply,
        } = envelope;
        debug!(action = request.action(), sender = ?sender, "Handling request");

        let response = match request {
            Request::ApiLog { payload } => self.handle_api_log(*payload, sender).await,
            Request::GetState => Response::State(self.store.state()),
            Request::SetRecording { value } => {
                let state = self.store.set_recording(value).await;
                self.broadcast_state(state);
                Response::State(state)
            }
            Request::SetPaused { paused } => {
                let state = self.store.set_paused(paused).await;
                self.broadcast_state(state);
                Response::State(state)
            }
            Request::GetLogs => Response::Logs {
                logs: self.store.logs(),
            },
            Request::ClearLogs => {
                self.store.clear_logs().await;
                Response::Ack { ok: true }
            }
            Request::FilterLogs { filters } => Response::Logs {
                logs: filter_logs(&self.store.logs(), &filters),
            },
            Request::GetStats => Response::Stats {
                stats: Box::new(compute_stats(&self.store.logs())),
            },
            Request::UpdateSettings { settings } => self.handle_update_settings(&settings).await,
            Request::GetSettings => Response::Settings {
                settings: Box::new(self.store.settings().clone()),
            },
        };

        if let Some(reply) = reply {
            if reply.send(response).is_err() {
                debug!("Requester went away before the reply");
            }
        }
    }

    async fn handle_api_log(&mut self, record: CaptureRecord, sender: Option<ContextId>) -> Response {
        let outcome = self.store.append_log(record, sender).await;
        Response::Ack {
            ok: matches!(outcome, AppendOutcome::Stored { .. }),
        }
    }

    async fn handle_update_settings(&mut self, settings: &Value) -> Response {
        match self.store.update_settings(settings).await {
            Ok(()) => {
                self.restart_cleanup();
                Response::Ack { ok: true }
            }
            Err(e) => {
                warn!("Rejected settings update: {}", e);
                Response::Ack { ok: false }
            }
        }
    }

    fn broadcast_state(&self, state: StateSnapshot) {
        let delivered = self.registry.broadcast(&state);
        debug!("State pushed to {} contexts", delivered);
    }

    /// Cancel any running cleanup timer and start one for the current settings
    fn restart_cleanup(&mut self) {
        if let Some(token) = self.cleanup.take() {
            token.cancel();
        }

        let auto = &self.store.settings().security.auto_cleanup;
        if !auto.enabled {
            return;
        }

        let period = Duration::from_secs(auto.interval_minutes.max(1) * 60);
        let token = self.shutdown.child_token();
        tokio::spawn(run_cleanup_timer(period, self.timer_tx.clone(), token.clone()));
        self.cleanup = Some(token);

        debug!("Auto-cleanup scheduled every {:?}", period);
    }
}

async fn run_cleanup_timer(
    period: Duration,
    inbox: mpsc::WeakUnboundedSender<Inbound>,
    token: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(tx) = inbox.upgrade() else { break };
                if tx.send(Inbound::CleanupTick).is_err() {
                    break;
                }
            }
        }
    }
}

/// Client side of the authority
#[derive(Clone)]
pub struct AuthorityHandle {
    tx: mpsc::UnboundedSender<Inbound>,
    registry: Arc<ContextRegistry<StateSnapshot>>,
    shutdown: CancellationToken,
}

impl AuthorityHandle {
    /// Send a request and wait for its reply
    pub async fn request(&self, request: Request, sender: Option<ContextId>) -> Result<Response> {
        let action = request.action();
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            request,
            sender,
            reply: Some(reply_tx),
        };

        self.tx
            .send(Inbound::Request(envelope))
            .map_err(|_| EngineError::ContextGone("authority".to_string()))?;

        reply_rx
            .await
            .map_err(|_| EngineError::ContextGone(format!("authority dropped {}", action)))
    }

    /// Fire-and-forget
    pub fn post(&self, request: Request, sender: Option<ContextId>) -> Delivery {
        let envelope = Envelope {
            request,
            sender,
            reply: None,
        };
        match self.tx.send(Inbound::Request(envelope)) {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                debug!("Authority is gone, post dropped");
                Delivery::ContextGone
            }
        }
    }

    /// Register a context for state pushes
    pub fn attach_context(&self, context: ContextId) -> mpsc::UnboundedReceiver<StateSnapshot> {
        self.registry.register(context)
    }

    pub fn detach_context(&self, context: ContextId) {
        self.registry.unregister(context);
    }

    pub fn attached_contexts(&self) -> usize {
        self.registry.len()
    }

    /// Stop the authority; queued requests are dropped
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    pub async fn get_state(&self) -> Result<StateSnapshot> {
        match self.request(Request::GetState, None).await? {
            Response::State(state) => Ok(state),
            other => Err(unexpected("get_state", &other)),
        }
    }

    pub async fn set_recording(&self, value: bool) -> Result<StateSnapshot> {
        match self.request(Request::SetRecording { value }, None).await? {
            Response::State(state) => Ok(state),
            other => Err(unexpected("set_recording", &other)),
        }
    }

    pub async fn set_paused(&self, paused: bool) -> Result<StateSnapshot> {
        match self.request(Request::SetPaused { paused }, None).await? {
            Response::State(state) => Ok(state),
            other => Err(unexpected("set_paused", &other)),
        }
    }

    /// Append a record and wait until the authority handled it
    pub async fn append_log(&self, record: CaptureRecord, sender: Option<ContextId>) -> Result<bool> {
        let request = Request::ApiLog {
            payload: Box::new(record),
        };
        self.ack(request, sender, "api_log").await
    }

    pub async fn get_logs(&self) -> Result<Vec<CaptureRecord>> {
        match self.request(Request::GetLogs, None).await? {
            Response::Logs { logs } => Ok(logs),
            other => Err(unexpected("get_logs", &other)),
        }
    }

    pub async fn clear_logs(&self) -> Result<bool> {
        self.ack(Request::ClearLogs, None, "clear_logs").await
    }

    pub async fn filter_logs(&self, filters: LogFilters) -> Result<Vec<CaptureRecord>> {
        match self.request(Request::FilterLogs { filters }, None).await? {
            Response::Logs { logs } => Ok(logs),
            other => Err(unexpected("filter_logs", &other)),
        }
    }

    pub async fn get_stats(&self) -> Result<LogStats> {
        match self.request(Request::GetStats, None).await? {
            Response::Stats { stats } => Ok(*stats),
            other => Err(unexpected("get_stats", &other)),
        }
    }

    /// `Ok(false)` when the document was rejected and the old settings kept
    pub async fn update_settings(&self, settings: Value) -> Result<bool> {
        self.ack(Request::UpdateSettings { settings }, None, "update_settings")
            .await
    }

    pub async fn get_settings(&self) -> Result<Settings> {
        match self.request(Request::GetSettings, None).await? {
            Response::Settings { settings } => Ok(*settings),
            other => Err(unexpected("get_settings", &other)),
        }
    }

    async fn ack(
        &self,
        request: Request,
        sender: Option<ContextId>,
        action: &str,
    ) -> Result<bool> {
        match self.request(request, sender).await? {
            Response::Ack { ok } => Ok(ok),
            other => Err(unexpected(action, &other)),
        }
    }
}

fn unexpected(action: &str, response: &Response) -> EngineError {
    EngineError::RelayFailed(format!("Unexpected reply to {}: {:?}", action, response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::StatusFilter;
    use crate::recording::record::ApiType;
    use crate::recording::storage::{keys, MemoryStorage};
    use serde_json::json;

    fn record(url: &str, status: u16) -> CaptureRecord {
        CaptureRecord::new(ApiType::Fetch, url)
            .with_method("GET")
            .with_status(status)
    }

    fn spawn_fresh() -> (Arc<MemoryStorage>, AuthorityHandle) {
        let storage = Arc::new(MemoryStorage::new());
        let handle = AuthorityService::spawn(storage.clone(), StartMode::Install);
        (storage, handle)
    }

    #[tokio::test]
    async fn test_state_requests() {
        let (_, authority) = spawn_fresh();

        let state = authority.get_state().await.unwrap();
        assert!(!state.recording);

        let state = authority.set_recording(true).await.unwrap();
        assert!(state.recording);
        assert!(!state.paused);

        let state = authority.set_paused(true).await.unwrap();
        assert!(state.recording && state.paused);
    }

    #[tokio::test]
    async fn test_append_filter_and_stats() {
        let (_, authority) = spawn_fresh();
        authority.set_recording(true).await.unwrap();

        assert!(authority.append_log(record("https://a.com/1", 200), Some(1)).await.unwrap());
        assert!(authority.append_log(record("https://a.com/2", 500), Some(1)).await.unwrap());

        let errors = authority
            .filter_logs(LogFilters {
                status_codes: StatusFilter::Errors,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].tab_id, Some(1));

        let stats = authority.get_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.errors, 1);

        assert!(authority.clear_logs().await.unwrap());
        assert!(authority.get_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_posts_are_served_in_order() {
        let (_, authority) = spawn_fresh();
        authority.set_recording(true).await.unwrap();

        for i in 0..20 {
            let request = Request::ApiLog {
                payload: Box::new(record(&format!("https://a.com/{}", i), 200)),
            };
            assert!(authority.post(request, Some(9)).is_delivered());
        }

        let logs = authority.get_logs().await.unwrap();
        assert_eq!(logs.len(), 20);
        assert_eq!(logs[0].url, "https://a.com/0");
        assert_eq!(logs[19].url, "https://a.com/19");
    }

    #[tokio::test]
    async fn test_flag_changes_are_pushed() {
        let (_, authority) = spawn_fresh();
        let mut pushes = authority.attach_context(4);
        let dead = authority.attach_context(5);
        drop(dead);

        authority.set_recording(true).await.unwrap();
        authority.set_paused(true).await.unwrap();

        let first = pushes.recv().await.unwrap();
        assert!(first.recording && !first.paused);
        let second = pushes.recv().await.unwrap();
        assert!(second.paused);
        assert_eq!(authority.attached_contexts(), 1);
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let (_, authority) = spawn_fresh();
        let ok = authority
            .update_settings(json!({ "performance": { "maxLogs": "lots" } }))
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(authority.get_settings().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_resume_serves_persisted_state() {
        let (storage, authority) = spawn_fresh();
        authority.set_recording(true).await.unwrap();
        authority.append_log(record("https://a.com/1", 200), None).await.unwrap();
        authority.shutdown();

        let resumed = AuthorityService::spawn(storage.clone(), StartMode::Resume);
        let state = resumed.get_state().await.unwrap();
        assert!(state.recording);
        assert_eq!(state.count, 1);
        assert_eq!(storage.raw(keys::RECORDING), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_requests_after_shutdown() {
        let (_, authority) = spawn_fresh();
        authority.get_state().await.unwrap();
        authority.shutdown();

        let err = loop {
            match authority.get_state().await {
                Err(e) => break e,
                Ok(_) => tokio::task::yield_now().await,
            }
        };
        assert!(err.is_context_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_cleanup_timer() {
        let (_, authority) = spawn_fresh();
        authority.set_recording(true).await.unwrap();
        for i in 0..5 {
            authority
                .append_log(record(&format!("https://a.com/{}", i), 200), None)
                .await
                .unwrap();
        }

        let ok = authority
            .update_settings(json!({
                "security": { "autoCleanup": { "enabled": true, "intervalMinutes": 1, "maxRecords": 2 } }
            }))
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(authority.get_state().await.unwrap().count, 5);

        tokio::time::sleep(Duration::from_secs(61)).await;

        let logs = authority.get_logs().await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].url, "https://a.com/3");
    }
}
