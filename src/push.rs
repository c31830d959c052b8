//! Push channel contract and its WebSocket realisation.
//!
//! Broadcasts are best-effort: [`PushChannel::broadcast`] never waits on a
//! client. Client connects, disconnects and text messages are pushed onto the
//! bridge event queue by the per-connection tasks.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::bridge::BridgeEvent;
use crate::protocol::MAX_ACTION_LEN;

pub type ClientId = u32;

pub const DEFAULT_MAX_CLIENTS: usize = 8;
pub const DEFAULT_PUSH_PORT: u16 = 8080;
pub const DEFAULT_PUSH_PATH: &str = "/ws";
/// A connection that has not completed the upgrade within this long is dropped.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Largest client message accepted. A JSON string never decodes to more bytes
/// than its encoded text, so any accepted action fits in one link payload.
pub const MAX_CLIENT_MESSAGE_SIZE: usize = MAX_ACTION_LEN;
const OUTBOUND_BUFFER_SIZE: usize = 64;

/// Fan-out transport towards browser clients.
pub trait PushChannel {
    /// Queue `text` for every connected client. Returns how many were reached.
    fn broadcast(&mut self, text: &str) -> usize;

    /// Forget closed clients and close the oldest ones above the client limit,
    /// including connections still in the upgrade handshake.
    fn cleanup_clients(&mut self);

    fn client_count(&self) -> usize;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub bind: SocketAddr,
    /// Request path clients must use for the WebSocket upgrade.
    pub path: String,
    pub max_clients: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PUSH_PORT)),
            path: DEFAULT_PUSH_PATH.to_string(),
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

#[derive(Debug)]
struct ClientHandle {
    id: ClientId,
    addr: SocketAddr,
    task: JoinHandle<()>,
    close: Option<oneshot::Sender<()>>,
}

impl ClientHandle {
    fn request_close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

/// WebSocket push channel.
///
/// The accept loop runs as its own task and hands every new connection to
/// the channel through a registration queue, drained on each cleanup pass.
#[derive(Debug)]
pub struct WsPushChannel {
    outbound: broadcast::Sender<Arc<str>>,
    registrations: mpsc::UnboundedReceiver<ClientHandle>,
    clients: BTreeMap<ClientId, ClientHandle>,
    max_clients: usize,
    local_addr: SocketAddr,
    acceptor: JoinHandle<()>,
}

impl WsPushChannel {
    pub async fn bind(config: &PushConfig, events: mpsc::Sender<BridgeEvent>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        let local_addr = listener.local_addr()?;
        info!("WebSocket push channel listening on ws://{}{}", local_addr, config.path);

        let (outbound, _) = broadcast::channel(OUTBOUND_BUFFER_SIZE);
        let (register_tx, registrations) = mpsc::unbounded_channel();

        let acceptor = tokio::spawn(accept_loop(
            listener,
            Arc::from(config.path.as_str()),
            outbound.clone(),
            register_tx,
            events,
        ));

        Ok(Self {
            outbound,
            registrations,
            clients: BTreeMap::new(),
            max_clients: config.max_clients,
            local_addr,
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl PushChannel for WsPushChannel {
    fn broadcast(&mut self, text: &str) -> usize {
        // Err only means nobody is subscribed
        self.outbound.send(Arc::from(text)).unwrap_or(0)
    }

    fn cleanup_clients(&mut self) {
        while let Ok(handle) = self.registrations.try_recv() {
            self.clients.insert(handle.id, handle);
        }

        self.clients.retain(|_, client| !client.task.is_finished());

        while self.clients.len() > self.max_clients {
            let Some((_, mut oldest)) = self.clients.pop_first() else {
                break;
            };
            info!("Closing client #{} ({}): client limit {} reached", oldest.id, oldest.addr, self.max_clients);
            oldest.request_close();
        }
    }

    fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Drop for WsPushChannel {
    fn drop(&mut self) {
        self.acceptor.abort();
        for client in self.clients.values_mut() {
            client.request_close();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    path: Arc<str>,
    outbound: broadcast::Sender<Arc<str>>,
    registrations: mpsc::UnboundedSender<ClientHandle>,
    events: mpsc::Sender<BridgeEvent>,
) {
    let mut next_id: ClientId = 1;

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let id = next_id;
        next_id = next_id.wrapping_add(1);

        let (close_tx, close_rx) = oneshot::channel();
        let session = ClientSession {
            id,
            addr,
            path: Arc::clone(&path),
            outbound: outbound.subscribe(),
            events: events.clone(),
            close: close_rx,
        };
        let task = tokio::spawn(session.run(stream));

        let handle = ClientHandle { id, addr, task, close: Some(close_tx) };
        if registrations.send(handle).is_err() {
            debug!("Push channel dropped, stopping accept loop");
            break;
        }
    }
}

struct ClientSession {
    id: ClientId,
    addr: SocketAddr,
    path: Arc<str>,
    outbound: broadcast::Receiver<Arc<str>>,
    events: mpsc::Sender<BridgeEvent>,
    close: oneshot::Receiver<()>,
}

fn session_config() -> WebSocketConfig {
    WebSocketConfig {
        max_message_size: Some(MAX_CLIENT_MESSAGE_SIZE),
        max_frame_size: Some(MAX_CLIENT_MESSAGE_SIZE),
        ..Default::default()
    }
}

impl ClientSession {
    async fn run(mut self, stream: TcpStream) {
        let expected_path = Arc::clone(&self.path);
        let check_path = move |req: &Request, resp: Response| {
            if req.uri().path() == &*expected_path {
                Ok(resp)
            } else {
                let mut rejection = ErrorResponse::new(Some("unknown path".to_string()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        };
        let handshake = time::timeout(
            HANDSHAKE_TIMEOUT,
            tokio_tungstenite::accept_hdr_async_with_config(stream, check_path, Some(session_config())),
        );

        // Dropping the pending handshake closes the TCP stream
        let ws = tokio::select! {
            result = handshake => match result {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    debug!("WebSocket handshake with {} failed: {}", self.addr, e);
                    return;
                }
                Err(_) => {
                    debug!("WebSocket handshake with {} timed out", self.addr);
                    return;
                }
            },
            _ = &mut self.close => {
                debug!("Client #{} closed before completing the handshake", self.id);
                return;
            }
        };

        let connected = BridgeEvent::ClientConnected { client: self.id, addr: self.addr };
        if self.events.send(connected).await.is_err() {
            return;
        }

        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let event = BridgeEvent::ClientMessage { client: self.id, text };
                        if self.events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!("Ignoring {}-byte binary message from client #{}", data.len(), self.id);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error from client #{}: {}", self.id, e);
                        break;
                    }
                },

                outgoing = self.outbound.recv() => match outgoing {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text.to_string())).await {
                            debug!("Failed to send to client #{}: {}", self.id, e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client #{} lagged, skipped {} messages", self.id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                _ = &mut self.close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        let _ = self.events.send(BridgeEvent::ClientDisconnected { client: self.id }).await;
    }
}
