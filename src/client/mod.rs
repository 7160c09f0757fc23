// src/client/mod.rs

//! Client side of the presence layer: one connection per authenticated
//! session, mirroring the server's online-user broadcasts into local state.

mod endpoint;
mod manager;

pub use endpoint::{Endpoint, Mode, DEVELOPMENT_BASE_URL};
pub use manager::{
    ClientConnectionId, ClientState, ConnectionEvent, ConnectionManager, ConnectionStatus,
    DEFAULT_CONNECT_TIMEOUT,
};
