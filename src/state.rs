// src/state.rs

use crate::config::Config;
use crate::error::Result;
use crate::presence::PresenceRegistry;
use axum::http::HeaderValue;
use std::sync::Arc;

/// The application's shared state, accessible from all request handlers.
/// Created once at startup and shared across all connections via Axum's state management.
#[derive(Clone)]
pub struct AppState {
    pub presence: PresenceRegistry,
    /// Browser origins allowed to open a connection.
    pub allowed_origins: Arc<Vec<HeaderValue>>,
}

impl AppState {
    pub fn new(allowed_origins: Vec<HeaderValue>) -> Self {
        Self {
            presence: PresenceRegistry::new(),
            allowed_origins: Arc::new(allowed_origins),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.origin_allowlist()?))
    }

    /// Requests without an `Origin` header come from non-browser clients and are accepted.
    pub fn origin_allowed(&self, origin: Option<&HeaderValue>) -> bool {
        origin.is_none_or(|origin| self.allowed_origins.contains(origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_check() {
        let state = AppState::new(vec![HeaderValue::from_static("http://localhost:5173")]);
        assert!(state.origin_allowed(None));
        assert!(state.origin_allowed(Some(&HeaderValue::from_static("http://localhost:5173"))));
        assert!(!state.origin_allowed(Some(&HeaderValue::from_static("http://evil.test"))));
    }
}
