// src/relay/page.rs
//! Page context
//!
//! Holds the request surfaces page code calls through, the page bus and the
//! cached capture gate. Installing the interceptor swaps the surfaces for
//! their instrumented versions and starts the listener that applies state
//! updates arriving on the bus.

use crate::interception::gate::{CaptureEmitter, CaptureGate};
use crate::interception::surfaces::{
    EventSourceConnector, FetchIssuer, SocketConnector, Surfaces, XhrTransport,
};
use crate::recording::record::ContextId;
use crate::relay::channel::PageBus;
use crate::relay::protocol::PageMessage;
use crate::utils::config::RelaySection;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One page (tab) of the host application
pub struct PageContext {
    id: ContextId,
    bus: PageBus,
    gate: Arc<CaptureGate>,
    surfaces: RwLock<Surfaces>,
    installed: AtomicBool,
    lifetime: CancellationToken,
}

impl PageContext {
    /// Create a page over the given surfaces
    pub fn new(id: ContextId, surfaces: Surfaces, bus_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            bus: PageBus::new(id, bus_capacity),
            gate: Arc::new(CaptureGate::new()),
            surfaces: RwLock::new(surfaces),
            installed: AtomicBool::new(false),
            lifetime: CancellationToken::new(),
        })
    }

    /// Page over `surfaces` with the bus sized from configuration
    pub fn configured(id: ContextId, surfaces: Surfaces, relay: &RelaySection) -> Arc<Self> {
        Self::new(id, surfaces, relay.page_bus_capacity)
    }

    /// Page over the network-backed platform surfaces
    pub fn with_platform(id: ContextId, bus_capacity: usize) -> Arc<Self> {
        Self::new(id, Surfaces::platform(), bus_capacity)
    }

    /// Instrument the surfaces and start listening for state updates
    ///
    /// Returns `false` when the interceptor was already installed on this
    /// page; the call is then a no-op. Must run inside a tokio runtime.
    pub fn install_interceptor(&self) -> bool {
        if self.installed.swap(true, Ordering::SeqCst) {
            debug!("Interceptor already installed on page {}", self.id);
            return false;
        }

        let emitter = CaptureEmitter::new(self.gate.clone(), Arc::new(self.bus.clone()));
        {
            let mut surfaces = self.surfaces.write();
            *surfaces = surfaces.clone().instrument(&emitter);
        }

        let mut updates = self.bus.subscribe();
        let gate = self.gate.clone();
        let lifetime = self.lifetime.clone();
        let id = self.id;
        tokio::spawn(async move {
            loop {
                let value = tokio::select! {
                    _ = lifetime.cancelled() => break,
                    received = updates.recv() => match received {
                        Ok(value) => value,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("Page {} listener lagged by {} messages", id, skipped);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                };

                if let Some(PageMessage::StateUpdate(state)) = PageMessage::from_value(&value) {
                    gate.apply(state);
                    debug!(
                        "Page {} state updated: recording={}, paused={}",
                        id, state.recording, state.paused
                    );
                }
            }
        });

        self.bus.post(&PageMessage::RequestState);
        info!("Interceptor installed on page {}", self.id);
        true
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Tear the page down; its listener stops and later bus traffic is unanswered
    pub fn close(&self) {
        self.lifetime.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn bus(&self) -> &PageBus {
        &self.bus
    }

    pub fn gate(&self) -> &CaptureGate {
        &self.gate
    }

    pub fn fetch(&self) -> Arc<dyn FetchIssuer> {
        self.surfaces.read().fetch.clone()
    }

    pub fn xhr(&self) -> Arc<dyn XhrTransport> {
        self.surfaces.read().xhr.clone()
    }

    pub fn socket(&self) -> Arc<dyn SocketConnector> {
        self.surfaces.read().socket.clone()
    }

    pub fn event_source(&self) -> Arc<dyn EventSourceConnector> {
        self.surfaces.read().event_source.clone()
    }
}

impl Drop for PageContext {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::recorder::RuntimeState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let page = PageContext::with_platform(1, 16);
        let mut bus = page.bus().subscribe();

        assert!(page.install_interceptor());
        let first = page.fetch();
        assert!(first.is_instrumented());

        assert!(!page.install_interceptor());
        assert!(Arc::ptr_eq(&first, &page.fetch()));

        let value = bus.recv().await.unwrap();
        assert_eq!(PageMessage::from_value(&value), Some(PageMessage::RequestState));
    }

    #[tokio::test]
    async fn test_state_update_opens_gate() {
        let page = PageContext::with_platform(2, 16);
        page.install_interceptor();
        assert!(!page.gate().is_open());

        page.bus().post(&PageMessage::StateUpdate(RuntimeState {
            recording: true,
            paused: false,
        }));

        tokio::time::timeout(Duration::from_secs(1), async {
            while !page.gate().is_open() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_configured_bus_capacity() {
        let relay = RelaySection {
            page_bus_capacity: 2,
        };
        let page = PageContext::configured(4, Surfaces::platform(), &relay);
        let mut bus = page.bus().subscribe();

        for _ in 0..3 {
            page.bus().post(&PageMessage::RequestState);
        }
        assert!(matches!(bus.recv().await, Err(RecvError::Lagged(1))));
        assert!(bus.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_page_ignores_updates() {
        let page = PageContext::with_platform(3, 16);
        page.install_interceptor();
        page.close();
        assert!(page.is_closed());

        tokio::time::sleep(Duration::from_millis(20)).await;
        page.bus().post(&PageMessage::StateUpdate(RuntimeState {
            recording: true,
            paused: false,
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!page.gate().is_open());
    }
}
