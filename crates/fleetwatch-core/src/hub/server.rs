// ── Websocket server ──
//
// Accept loop plus one task per connection. Each connection runs a writer
// (hub queue → socket) and a reader (socket → router) until either side
// ends, the hub kicks the client, or the server shuts down.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{Connection, Hub, Router};
use crate::error::CoreError;
use crate::store::DeviceStore;

/// Serve dashboard clients on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    hub: Arc<Hub>,
    store: Arc<DeviceStore>,
    router: Router,
    cancel: CancellationToken,
) -> Result<(), CoreError> {
    let addr = listener.local_addr()?;
    info!(%addr, "dashboard server listening");

    loop {
        let (stream, peer) = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            },
        };

        tokio::spawn(handle_connection(
            stream,
            peer,
            Arc::clone(&hub),
            Arc::clone(&store),
            router.clone(),
            cancel.child_token(),
        ));
    }

    hub.disconnect_all();
    info!(%addr, "dashboard server stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<Hub>,
    store: Arc<DeviceStore>,
    router: Router,
    cancel: CancellationToken,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };

    let Connection {
        id,
        mut outbound,
        kicked,
    } = hub.connect(&store);
    debug!(client = id, %peer, "websocket established");

    let (mut sink, mut source) = ws.split();

    let writer = async {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sink.send(frame).await {
                debug!(client = id, error = %e, "websocket write failed");
                break;
            }
        }
    };

    let reader = async {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => router.handle_text(id, text.as_str()).await,
                Ok(Message::Close(_)) => break,
                Ok(Message::Binary(_)) => {
                    warn!(client = id, "dropping binary frame");
                }
                Ok(_) => trace!(client = id, "control frame"),
                Err(e) => {
                    debug!(client = id, error = %e, "websocket read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        () = cancel.cancelled() => {}
        () = kicked.cancelled() => {}
        () = writer => {}
        () = reader => {}
    }

    hub.disconnect(id);
    let _ = sink.close().await;
}
