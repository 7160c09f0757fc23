// src/client/manager.rs

use super::endpoint::Endpoint;
use crate::models::ServerMessage;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

const EVENT_CAPACITY: usize = 32;

/// How long the WebSocket handshake may take before the attempt is reported as failed.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Handle of one connection attempt made by a [`ConnectionManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientConnectionId(u64);

/// Local mirror of the session's connection and of who is online.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientState {
    pub status: ConnectionStatus,
    /// The current handle. After a transport drop it stays set, marking a
    /// stale handle the next `connect` tears down.
    pub connection: Option<ClientConnectionId>,
    pub online_users: Vec<String>,
}

/// Things observed on the transport. Purely informational: nothing here is retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected(ClientConnectionId),
    Disconnected {
        connection: ClientConnectionId,
        reason: String,
    },
    Error {
        connection: ClientConnectionId,
        message: String,
    },
}

struct ActiveConnection {
    id: ClientConnectionId,
    shutdown: oneshot::Sender<()>,
}

/// Owns the single connection of an authenticated session.
///
/// `connect` and `disconnect` return immediately; outcomes are observed
/// through [`Self::subscribe`] and [`Self::events`]. Both must be called from
/// within a tokio runtime.
pub struct ConnectionManager {
    endpoint: Endpoint,
    state: Arc<watch::Sender<ClientState>>,
    events: broadcast::Sender<ConnectionEvent>,
    active: Option<ActiveConnection>,
    next_id: u64,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(endpoint: Endpoint) -> Self {
        let (state, _) = watch::channel(ClientState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            endpoint,
            state: Arc::new(state),
            events,
            active: None,
            next_id: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Opens a connection for the session's user.
    ///
    /// Does nothing without a session, while connected, or while a previous
    /// attempt is still connecting. A stale handle left by a dropped
    /// connection is torn down before the new one is opened.
    pub fn connect(&mut self, session_user_id: Option<&str>) {
        let Some(user_id) = session_user_id else {
            tracing::debug!("connect ignored: no authenticated session");
            return;
        };

        let status = self.state.borrow().status;
        match status {
            ConnectionStatus::Connected => return,
            ConnectionStatus::Connecting => {
                tracing::warn!("connect ignored: a connection attempt is already in flight");
                return;
            }
            ConnectionStatus::Disconnected => {}
        }

        self.teardown();

        self.next_id += 1;
        let id = ClientConnectionId(self.next_id);
        self.state.send_modify(|state| {
            state.status = ConnectionStatus::Connecting;
            state.connection = Some(id);
        });

        let (shutdown, shutdown_rx) = oneshot::channel();
        let link = Link {
            id,
            state: self.state.clone(),
            events: self.events.clone(),
        };
        let url = self.endpoint.connect_url(user_id);
        tracing::info!(%url, "connecting");
        tokio::spawn(run_connection(link, url, self.connect_timeout, shutdown_rx));

        self.active = Some(ActiveConnection { id, shutdown });
    }

    /// Closes the connection, or abandons an attempt still in flight, and
    /// forgets who is online. Does nothing while disconnected.
    pub fn disconnect(&mut self) {
        if self.status() == ConnectionStatus::Disconnected {
            return;
        }

        self.teardown();
        self.state.send_modify(|state| {
            state.status = ConnectionStatus::Disconnected;
            state.connection = None;
            state.online_users.clear();
        });
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    pub fn online_users(&self) -> Vec<String> {
        self.state.borrow().online_users.clone()
    }

    /// Watch the local state; every change to status or online users is published here.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    /// Observe connects, disconnects and connection errors.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Detaches the current handle's listener and closes its transport.
    /// The task stops writing state as soon as it is no longer the current handle.
    fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        tracing::debug!(connection = ?active.id, "tearing down connection");
        // Err means the task already exited.
        let _ = active.shutdown.send(());
    }
}

/// What a connection task needs to publish into the manager's state.
struct Link {
    id: ClientConnectionId,
    state: Arc<watch::Sender<ClientState>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Link {
    /// Applies `modify` only while this link is still the current handle.
    fn update(&self, modify: impl FnOnce(&mut ClientState)) -> bool {
        self.state.send_if_modified(|state| {
            if state.connection != Some(self.id) {
                return false;
            }
            modify(state);
            true
        })
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn apply(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::GetOnlineUsers(users)) => {
                self.update(|state| state.online_users = users);
            }
            Err(e) => tracing::debug!(error = %e, "ignoring unrecognized server message"),
        }
    }

    fn dropped(&self, reason: String) {
        tracing::info!(connection = ?self.id, %reason, "socket disconnected");
        if self.update(|state| state.status = ConnectionStatus::Disconnected) {
            self.emit(ConnectionEvent::Disconnected {
                connection: self.id,
                reason,
            });
        }
    }

    fn failed(&self, message: String) {
        tracing::warn!(connection = ?self.id, error = %message, "socket connection error");
        if self.update(|state| state.status = ConnectionStatus::Disconnected) {
            self.emit(ConnectionEvent::Error {
                connection: self.id,
                message,
            });
        }
    }
}

async fn run_connection(
    link: Link,
    url: Url,
    connect_timeout: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let connected = tokio::select! {
        _ = &mut shutdown => return,
        result = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str())) => result,
    };
    let stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            link.failed(e.to_string());
            return;
        }
        Err(_) => {
            link.failed(format!("handshake timed out after {connect_timeout:?}"));
            return;
        }
    };

    if !link.update(|state| state.status = ConnectionStatus::Connected) {
        return;
    }
    tracing::info!(connection = ?link.id, "socket connected");
    link.emit(ConnectionEvent::Connected(link.id));

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => link.apply(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "server closed the connection".to_string());
                    link.dropped(reason);
                    // Flushes the close reply tungstenite queued for the server.
                    let _ = write.close().await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    link.failed(e.to_string());
                    break;
                }
                None => {
                    link.dropped("connection closed".to_string());
                    break;
                }
            }
        }
    }
}
