// src/client/endpoint.rs

use crate::error::{Error, Result};
use url::Url;

/// Where the server listens during local development.
pub const DEVELOPMENT_BASE_URL: &str = "http://localhost:5001";

/// Build mode of the client, which decides the server it talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    /// Anything other than `"development"` is treated as production.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("development") {
            Self::Development
        } else {
            Self::Production
        }
    }
}

/// A resolved WebSocket endpoint of the presence server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Development mode always targets [`DEVELOPMENT_BASE_URL`];
    /// production targets the origin the client was served from.
    pub fn for_mode(mode: Mode, production_origin: &str) -> Result<Self> {
        match mode {
            Mode::Development => Self::parse(DEVELOPMENT_BASE_URL),
            Mode::Production => Self::parse(production_origin),
        }
    }

    /// Accepts `host:port`, `http(s)://...` or `ws(s)://...` and points it at `/ws`.
    pub fn parse(base: &str) -> Result<Self> {
        let with_scheme = if base.contains("://") {
            base.to_string()
        } else {
            format!("http://{base}")
        };
        let mut url = Url::parse(&with_scheme).map_err(|source| Error::InvalidEndpoint {
            endpoint: base.to_string(),
            source,
        })?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::UnsupportedScheme(url.scheme().to_string()))?;
        url.set_path("/ws");
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { url })
    }

    /// The URL to open for `user_id`, carried as the `userId` query parameter.
    pub fn connect_url(&self, user_id: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("userId", user_id);
        url
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }
}
