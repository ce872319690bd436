// ── Dashboard client hub ──
//
// Tracks live dashboard connections. Each client owns a bounded outbound
// queue drained by its connection task; producers only ever `try_send`,
// so a stalled socket never holds up the store or other clients. A client
// whose queue fills up is disconnected and resyncs on reconnect.

pub mod router;
pub mod server;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::{CommandResponse, ServerMessage};
use crate::store::{DeviceStore, UpdateSink};

pub use router::Router;
pub use server::serve;

pub type ClientId = u64;

struct ClientHandle {
    tx: mpsc::Sender<Message>,
    kicked: CancellationToken,
}

/// The receiving half handed to a connection task.
pub struct Connection {
    pub id: ClientId,
    /// Frames to write to the socket, in order.
    pub outbound: mpsc::Receiver<Message>,
    /// Cancelled when the hub drops this client.
    pub kicked: CancellationToken,
}

pub struct Hub {
    clients: DashMap<ClientId, ClientHandle>,
    next_id: AtomicU64,
    queue: usize,
}

enum Delivery {
    Sent,
    Full,
    Closed,
}

impl Hub {
    pub fn new(queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue: queue.max(1),
        }
    }

    /// Register a client and queue its `DEVICE_DATA_ALL` snapshot.
    ///
    /// Snapshot and registration happen under the store's sync fence, so
    /// the client sees every update made after the snapshot and none
    /// made before it.
    pub fn connect(&self, store: &DeviceStore) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, outbound) = mpsc::channel(self.queue);
        let kicked = CancellationToken::new();

        store.sync(|records| {
            match encode(&ServerMessage::DeviceDataAll(records)) {
                Ok(frame) => {
                    if let Err(e) = tx.try_send(frame) {
                        warn!(client = id, error = %e, "failed to queue snapshot");
                    }
                }
                Err(e) => warn!(client = id, error = %e, "failed to encode snapshot"),
            }
            self.clients.insert(
                id,
                ClientHandle {
                    tx,
                    kicked: kicked.clone(),
                },
            );
        });

        info!(client = id, clients = self.clients.len(), "client connected");
        Connection {
            id,
            outbound,
            kicked,
        }
    }

    /// Drop a client. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: ClientId) -> bool {
        match self.clients.remove(&id) {
            Some((_, handle)) => {
                handle.kicked.cancel();
                info!(client = id, clients = self.clients.len(), "client disconnected");
                true
            }
            None => false,
        }
    }

    /// Send to a single client. Failures are logged, never returned.
    pub fn send_to(&self, id: ClientId, message: &ServerMessage) -> bool {
        let frame = match encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(client = id, kind = message.kind(), error = %e, "failed to encode message");
                return false;
            }
        };

        let delivery = match self.clients.get(&id) {
            Some(handle) => deliver(&handle.tx, frame),
            None => {
                debug!(client = id, kind = message.kind(), "client gone, message dropped");
                return false;
            }
        };
        self.settle(id, delivery)
    }

    /// Send to every connected client. One failing client never affects
    /// delivery to the others.
    pub fn broadcast(&self, message: &ServerMessage) {
        let frame = match encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "failed to encode broadcast");
                return;
            }
        };

        // removal waits until iteration is done
        let failed: Vec<(ClientId, Delivery)> = self
            .clients
            .iter()
            .filter_map(|entry| match deliver(&entry.tx, frame.clone()) {
                Delivery::Sent => None,
                other => Some((*entry.key(), other)),
            })
            .collect();

        for (id, delivery) in failed {
            self.settle(id, delivery);
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_connected(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Drop every client, e.g. on shutdown.
    pub fn disconnect_all(&self) {
        let ids: Vec<ClientId> = self.clients.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.disconnect(id);
        }
    }

    fn settle(&self, id: ClientId, delivery: Delivery) -> bool {
        match delivery {
            Delivery::Sent => true,
            Delivery::Full => {
                warn!(client = id, "client queue full, disconnecting slow client");
                self.disconnect(id);
                false
            }
            Delivery::Closed => {
                self.disconnect(id);
                false
            }
        }
    }
}

impl UpdateSink for Hub {
    fn send_all(&self, message: &ServerMessage) {
        self.broadcast(message);
    }
}

fn deliver(tx: &mpsc::Sender<Message>, frame: Message) -> Delivery {
    match tx.try_send(frame) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => Delivery::Full,
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}

fn encode(message: &ServerMessage) -> Result<Message, serde_json::Error> {
    serde_json::to_string(message).map(Message::text)
}

// ── Responder ────────────────────────────────────────────────────────

/// Sends `PSTOOLS_COMMAND_RESPONSE` frames back to the client that issued
/// a command. May be used any number of times, from any task.
#[derive(Clone)]
pub struct Responder {
    hub: Arc<Hub>,
    client: ClientId,
}

impl Responder {
    pub fn new(hub: Arc<Hub>, client: ClientId) -> Self {
        Self { hub, client }
    }

    /// `false` once the client has gone away.
    pub fn send(&self, response: CommandResponse) -> bool {
        self.hub
            .send_to(self.client, &ServerMessage::PstoolsCommandResponse(response))
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
