// src/models.rs

use serde::{Deserialize, Serialize};

/// A message sent from the server to a client.
/// Serialized into JSON text as `{"event": "...", "data": ...}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// The ids of every user with at least one live connection, in registration order.
    #[serde(rename = "getOnlineUsers")]
    GetOnlineUsers(Vec<String>),
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Query parameters accepted on the WebSocket upgrade (`/ws?userId=...`).
#[derive(Deserialize, Debug, Default)]
pub struct ConnectQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl ConnectQuery {
    /// The user id to track, or `None` when absent or empty.
    pub fn tracked_user(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }
}
