// ── Monitor: the process-wide context ──
//
// Built once at startup. Wires the hub, store, engine and router
// together and owns the cancellation token that ends them all.

use std::sync::Arc;

use fleetwatch_api::DeviceClient;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collab::{ActionDispatcher, CommandRunner, UnconfiguredActions, UnconfiguredCommands};
use crate::config::MonitorConfig;
use crate::engine::Engine;
use crate::error::CoreError;
use crate::hub::{self, Hub, Router};
use crate::store::{Clock, DeviceStore, SystemClock};
use crate::watcher::Poller;

/// Handle to a running fleet monitor. Cheap to clone.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    hub: Arc<Hub>,
    store: Arc<DeviceStore>,
    engine: Arc<Engine>,
    router: Router,
    cancel: CancellationToken,
}

impl Monitor {
    /// Build a monitor that polls devices over HTTP and has no action or
    /// command collaborators.
    pub fn new(config: MonitorConfig) -> Result<Self, CoreError> {
        Self::builder(config).build()
    }

    pub fn builder(config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder {
            config,
            poller: None,
            actions: Arc::new(UnconfiguredActions),
            commands: Arc::new(UnconfiguredCommands),
            clock: Arc::new(SystemClock),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start one watcher per configured device. Returns how many started.
    pub async fn start(&self) -> usize {
        self.inner.engine.start().await
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, CoreError> {
        let addr = self.inner.config.server.listen;
        TcpListener::bind(addr)
            .await
            .map_err(|source| CoreError::Bind { addr, source })
    }

    /// Serve dashboard clients until [`shutdown`](Self::shutdown).
    pub async fn serve(&self, listener: TcpListener) -> Result<(), CoreError> {
        hub::serve(
            listener,
            Arc::clone(&self.inner.hub),
            Arc::clone(&self.inner.store),
            self.inner.router.clone(),
            self.inner.cancel.child_token(),
        )
        .await
    }

    /// Stop serving, kill every watcher, and drop every client.
    pub async fn shutdown(&self) {
        info!("shutting down monitor");
        self.inner.cancel.cancel();
        self.inner.engine.shutdown().await;
        self.inner.hub.disconnect_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.inner.store
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.inner.hub
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.inner.engine
    }
}

/// Swaps collaborators before the monitor is built.
pub struct MonitorBuilder {
    config: MonitorConfig,
    poller: Option<Arc<dyn Poller>>,
    actions: Arc<dyn ActionDispatcher>,
    commands: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
}

impl MonitorBuilder {
    #[must_use]
    pub fn poller(mut self, poller: Arc<dyn Poller>) -> Self {
        self.poller = Some(poller);
        self
    }

    #[must_use]
    pub fn actions(mut self, actions: Arc<dyn ActionDispatcher>) -> Self {
        self.actions = actions;
        self
    }

    #[must_use]
    pub fn commands(mut self, commands: Arc<dyn CommandRunner>) -> Self {
        self.commands = commands;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<Monitor, CoreError> {
        let config = self.config;
        config.validate()?;

        let hub = Arc::new(Hub::new(config.server.client_queue));
        let store = Arc::new(DeviceStore::with_clock(
            config.store.clone(),
            hub.clone(),
            self.clock,
        )?);
        let poller: Arc<dyn Poller> = match self.poller {
            Some(poller) => poller,
            None => Arc::new(DeviceClient::new(config.target.clone(), &config.transport)?),
        };
        let engine = Arc::new(Engine::new(
            config.ranges.clone(),
            poller,
            Arc::clone(&store),
        ));
        let router = Router::new(
            Arc::clone(&hub),
            Arc::clone(&store),
            Arc::clone(&engine),
            self.actions,
            self.commands,
        );

        Ok(Monitor {
            inner: Arc::new(MonitorInner {
                config,
                hub,
                store,
                engine,
                router,
                cancel: CancellationToken::new(),
            }),
        })
    }
}
