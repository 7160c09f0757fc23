// src/presence.rs

use crate::models::ServerMessage;
use axum::extract::ws::{close_code, CloseFrame, Message};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Opaque handle of one live WebSocket connection, minted by the WebSocket handler.
pub type ConnectionId = Uuid;

/// The sender half of a connection's outbound queue.
/// The connection's writer task owns the socket sink and drains this queue.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// User id to connection handles, keyed in registration order.
///
/// A user id is a key iff it has at least one handle: removing the last
/// handle removes the key, so a later reconnect appends it at the end again.
#[derive(Debug, Default)]
pub struct PresenceMap {
    users: IndexMap<String, Vec<ConnectionId>>,
}

impl PresenceMap {
    /// Adds `id` to the user's handles. Returns `true` when the user just came online.
    pub fn insert(&mut self, user_id: &str, id: ConnectionId) -> bool {
        match self.users.get_mut(user_id) {
            Some(handles) => {
                if !handles.contains(&id) {
                    handles.push(id);
                }
                false
            }
            None => {
                self.users.insert(user_id.to_string(), vec![id]);
                true
            }
        }
    }

    /// Removes `id` from the user's handles. Returns `true` when the user just went offline.
    pub fn remove(&mut self, user_id: &str, id: ConnectionId) -> bool {
        let Some(handles) = self.users.get_mut(user_id) else {
            return false;
        };
        handles.retain(|h| *h != id);
        if handles.is_empty() {
            self.users.shift_remove(user_id);
            return true;
        }
        false
    }

    pub fn connections(&self, user_id: &str) -> &[ConnectionId] {
        self.users.get(user_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[derive(Default)]
struct Registry {
    users: PresenceMap,
    /// Every attached connection, tracked or not. Broadcasts go to all of them.
    connections: HashMap<ConnectionId, ConnectionSender>,
}

impl Registry {
    /// Pushes the current online-user list into every outbound queue.
    /// Fire-and-forget: a closed queue belongs to a connection that is already
    /// on its way out and will deregister itself.
    fn broadcast_online_users(&self) {
        let message = ServerMessage::GetOnlineUsers(self.users.user_ids());
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize online users");
                return;
            }
        };
        let frame = Message::Text(text.into());

        for (id, sender) in &self.connections {
            if sender.send(frame.clone()).is_err() {
                tracing::debug!(connection = %id, "dropping broadcast for closed connection");
            }
        }
    }
}

/// Process-wide presence registry, shared by every connection handler.
///
/// Cloning is cheap and yields a handle to the same registry. All mutations
/// are serialized by one lock, so registry changes happen one at a time.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a freshly established connection and broadcasts the online users.
    ///
    /// Connections without a user id still receive broadcasts but are not
    /// tracked as present.
    pub async fn register_connection(
        &self,
        user_id: Option<&str>,
        id: ConnectionId,
        sender: ConnectionSender,
    ) {
        let mut registry = self.inner.lock().await;
        registry.connections.insert(id, sender);

        if let Some(user_id) = user_id.filter(|u| !u.is_empty()) {
            if registry.users.insert(user_id, id) {
                tracing::info!(user_id, "user online");
            }
        }

        registry.broadcast_online_users();
    }

    /// Detaches a connection and broadcasts the updated online users.
    /// Deregistering an unknown connection only rebroadcasts.
    pub async fn deregister_connection(&self, user_id: Option<&str>, id: ConnectionId) {
        let mut registry = self.inner.lock().await;
        registry.connections.remove(&id);

        if let Some(user_id) = user_id.filter(|u| !u.is_empty()) {
            if registry.users.remove(user_id, id) {
                tracing::info!(user_id, "user offline");
            }
        }

        registry.broadcast_online_users();
    }

    /// The live connection handles of a user, empty if the user is offline.
    pub async fn lookup_connections(&self, user_id: &str) -> Vec<ConnectionId> {
        self.inner.lock().await.users.connections(user_id).to_vec()
    }

    /// Delivery targets for a user. Same as [`Self::lookup_connections`].
    pub async fn get_receiver_socket_ids(&self, user_id: &str) -> Vec<ConnectionId> {
        self.lookup_connections(user_id).await
    }

    /// Online user ids in registration order.
    pub async fn snapshot(&self) -> Vec<String> {
        self.inner.lock().await.users.user_ids()
    }

    /// Sends `message` to every connection of `user_id`.
    /// Returns the number of connections whose queue accepted it.
    pub async fn send_to_user(&self, user_id: &str, message: &ServerMessage) -> usize {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize message");
                return 0;
            }
        };
        let frame = Message::Text(text.into());

        let registry = self.inner.lock().await;
        registry
            .users
            .connections(user_id)
            .iter()
            .filter_map(|id| registry.connections.get(id))
            .filter(|sender| sender.send(frame.clone()).is_ok())
            .count()
    }

    /// Asks every connection of `user_id` to close with `reason`.
    /// Each connection deregisters itself once the client answers.
    pub async fn close_user(&self, user_id: &str, reason: &str) -> usize {
        let frame = Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: reason.into(),
        }));

        let registry = self.inner.lock().await;
        let closed = registry
            .users
            .connections(user_id)
            .iter()
            .filter_map(|id| registry.connections.get(id))
            .filter(|sender| sender.send(frame.clone()).is_ok())
            .count();
        tracing::info!(user_id, closed, reason, "closing user connections");
        closed
    }

    /// Number of attached connections, tracked or not.
    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }
}
