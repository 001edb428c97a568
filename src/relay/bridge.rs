// src/relay/bridge.rs
//! Mediating context between one page and the authority
//!
//! Forwards captures from the page bus to the authority as `api_log`,
//! answers state requests from the page and relays state pushes back to it.
//! Either side may vanish at any time; the bridge logs and carries on until
//! it is detached or the page bus closes. When the authority stops, the page
//! is pushed the default (not recording) state, and
//! [`BridgeHandle::reattach`] connects it to a resumed authority.

use crate::recording::record::ContextId;
use crate::recording::recorder::{RuntimeState, StateSnapshot};
use crate::recording::service::AuthorityHandle;
use crate::relay::page::PageContext;
use crate::relay::protocol::{PageMessage, Request};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bridge task state
pub struct RelayBridge {
    page: Arc<PageContext>,
    authority: AuthorityHandle,
}

impl RelayBridge {
    /// Attach to `page`: install the interceptor, register for state pushes
    /// and immediately sync the page with the authority's flags
    pub fn attach(page: Arc<PageContext>, authority: AuthorityHandle) -> BridgeHandle {
        page.install_interceptor();

        let context = page.id();
        let pushes = authority.attach_context(context);
        let bus = page.bus().subscribe();
        let token = CancellationToken::new();

        let bridge = RelayBridge {
            page: page.clone(),
            authority,
        };
        let task = tokio::spawn(bridge.run(pushes, bus, token.clone()));

        info!("Relay bridge attached to page {}", context);
        BridgeHandle {
            context,
            page,
            token,
            task,
        }
    }

    async fn run(
        self,
        mut pushes: mpsc::UnboundedReceiver<StateSnapshot>,
        mut bus: broadcast::Receiver<Value>,
        token: CancellationToken,
    ) {
        let context = self.page.id();
        self.sync_state().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                push = pushes.recv() => match push {
                    Some(state) => {
                        self.page.bus().post(&PageMessage::StateUpdate(state.runtime()));
                    }
                    None => {
                        // Cached flags must not outlive the authority
                        debug!("Authority stopped pushing to page {}", context);
                        self.page
                            .bus()
                            .post(&PageMessage::StateUpdate(RuntimeState::default()));
                        break;
                    }
                },
                received = bus.recv() => match received {
                    Ok(value) => self.on_page_message(&value).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Page {} bus lagged, {} messages dropped", context, skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.authority.detach_context(context);
        info!("Relay bridge detached from page {}", context);
    }

    async fn on_page_message(&self, value: &Value) {
        match PageMessage::from_value(value) {
            Some(PageMessage::Capture(record)) => {
                let request = Request::ApiLog { payload: record };
                if !self.authority.post(request, Some(self.page.id())).is_delivered() {
                    debug!("Capture from page {} dropped, authority gone", self.page.id());
                }
            }
            Some(PageMessage::RequestState) => self.sync_state().await,
            // Our own pushes and unrelated page traffic
            Some(PageMessage::StateUpdate(_)) | None => {}
        }
    }

    /// Fetch the authority's flags and push them to the page
    async fn sync_state(&self) {
        match self.authority.get_state().await {
            Ok(state) => {
                self.page.bus().post(&PageMessage::StateUpdate(state.runtime()));
            }
            Err(e) if e.is_context_gone() => debug!("State sync skipped: {}", e),
            Err(e) => warn!("State sync failed: {}", e),
        }
    }
}

/// Handle to a running bridge
pub struct BridgeHandle {
    context: ContextId,
    page: Arc<PageContext>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn is_attached(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the bridge and wait for it to unregister
    pub async fn detach(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!("Relay bridge task for page {} failed: {}", self.context, e);
        }
    }

    /// Stop this bridge and attach the same page to `authority`
    ///
    /// Used after the authority was suspended and resumed; the new bridge
    /// syncs the page with the resumed flags on attach.
    pub async fn reattach(self, authority: AuthorityHandle) -> BridgeHandle {
        let page = self.page.clone();
        self.detach().await;
        RelayBridge::attach(page, authority)
    }
}
