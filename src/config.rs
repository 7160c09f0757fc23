// src/config.rs

use crate::error::{Error, Result};
use axum::http::HeaderValue;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};

/// Chat presence server
#[derive(Parser, Clone, Debug)]
#[command(name = "chat-presence-server", version, about = "Real-time chat presence server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PRESENCE_PORT", default_value_t = 5001)]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PRESENCE_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    /// Browser origins allowed to connect (comma-separated)
    #[arg(
        long = "allowed-origin",
        env = "PRESENCE_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173"
    )]
    pub allowed_origins: Vec<String>,

    /// Enable structured JSON logging
    #[arg(long, env = "PRESENCE_JSON_LOGS")]
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5001,
            bind_address: IpAddr::from([0, 0, 0, 0]),
            allowed_origins: vec!["http://localhost:5173".to_string()],
            json_logs: false,
        }
    }
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// The origin allowlist as header values.
    /// Wildcards are refused: the list must name every origin explicitly.
    pub fn origin_allowlist(&self) -> Result<Vec<HeaderValue>> {
        self.allowed_origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) if origin != "*" => Ok(value),
                _ => Err(Error::InvalidOrigin(origin.to_string())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_origin_list_from_flags() {
        let config = Config::try_parse_from([
            "chat-presence-server",
            "--port",
            "4000",
            "--allowed-origin",
            "http://a.test,https://b.test",
        ])
        .unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.socket_addr().port(), 4000);
        assert_eq!(
            config.origin_allowlist().unwrap(),
            vec![
                HeaderValue::from_static("http://a.test"),
                HeaderValue::from_static("https://b.test"),
            ]
        );
    }

    #[test]
    fn rejects_origin_that_is_not_a_header_value() {
        let config = Config {
            allowed_origins: vec!["http://bad\norigin".to_string()],
            ..Config::default()
        };
        assert!(matches!(config.origin_allowlist(), Err(Error::InvalidOrigin(_))));

        let config = Config {
            allowed_origins: vec!["*".to_string()],
            ..Config::default()
        };
        assert!(matches!(config.origin_allowlist(), Err(Error::InvalidOrigin(_))));
    }
}
