// src/lib.rs

//! Real-time chat presence: a server-side registry of who is connected and a
//! client-side manager for the session's single connection.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod presence;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::{Error, Result};
