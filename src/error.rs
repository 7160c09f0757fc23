// src/error.rs

use thiserror::Error;

/// Errors raised while setting things up. Transport failures on a live
/// connection are never reported through this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid allowed origin '{0}'")]
    InvalidOrigin(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
