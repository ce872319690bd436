// ── Inbound message router ──
//
// Decodes client frames and dispatches them to the engine, the store,
// or an external collaborator. Nothing a client sends can take the
// connection down: malformed frames are logged and dropped.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{ClientId, Hub, Responder};
use crate::collab::{ActionDispatcher, CommandRunner};
use crate::engine::Engine;
use crate::message::{ClientMessage, ServerMessage};
use crate::store::DeviceStore;

#[derive(Clone)]
pub struct Router {
    hub: Arc<Hub>,
    store: Arc<DeviceStore>,
    engine: Arc<Engine>,
    actions: Arc<dyn ActionDispatcher>,
    commands: Arc<dyn CommandRunner>,
}

impl Router {
    pub fn new(
        hub: Arc<Hub>,
        store: Arc<DeviceStore>,
        engine: Arc<Engine>,
        actions: Arc<dyn ActionDispatcher>,
        commands: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            hub,
            store,
            engine,
            actions,
            commands,
        }
    }

    /// Handle one text frame from `client`.
    pub async fn handle_text(&self, client: ClientId, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.dispatch(client, message).await,
            Err(e) => warn!(client, error = %e, "dropping malformed client message"),
        }
    }

    pub async fn dispatch(&self, client: ClientId, message: ClientMessage) {
        match message {
            ClientMessage::RefreshDevice(targets) => {
                debug!(client, targets = ?targets.targets, "refresh requested");
                self.engine.refresh(targets.targets.as_deref()).await;
            }
            ClientMessage::ClearDevice(targets) => {
                debug!(client, targets = ?targets.targets, "clear requested");
                let ids = targets.targets.as_deref();
                self.store.clear(ids);
                self.engine.refresh(ids).await;
            }
            ClientMessage::DeviceAction(request) => {
                debug!(client, action = %request.action, targets = ?request.targets, "device action");
                let pending = self.actions.dispatch(request);
                let hub = Arc::clone(&self.hub);
                tokio::spawn(async move {
                    let response = pending.await;
                    hub.send_to(client, &ServerMessage::DeviceActionResponse(response));
                });
            }
            ClientMessage::PstoolsCommand(request) => {
                debug!(client, mode = %request.mode, target = %request.target, "remote command");
                self.commands
                    .run(request, Responder::new(Arc::clone(&self.hub), client));
            }
        }
    }
}
