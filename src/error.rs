//! Error types for the WHOIS client

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::client::QueryState;

/// WHOIS client error type
///
/// Failed connection attempts are not represented here. They are recorded on the
/// [`WhoisResponse`](crate::WhoisResponse) and the query is left unconnected, so
/// callers check [`is_connected`](crate::WhoisQuery::is_connected) instead of
/// matching on an "exhausted retries" error.
#[derive(Error, Debug)]
pub enum WhoisError {
    #[error("Invalid WHOIS target: {0}")]
    InvalidTarget(String),

    #[error("Connection to the WHOIS server must be established before performing a request")]
    NotConnected,

    #[error("WHOIS query is already {0} and cannot be reused")]
    AlreadyFinished(QueryState),

    #[error("WHOIS request to {server} failed: {source}")]
    Request {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for WHOIS client operations
pub type WhoisResult<T> = Result<T, WhoisError>;

impl WhoisError {
    pub(crate) fn request(server: impl Into<String>, source: io::Error) -> Self {
        Self::Request {
            server: server.into(),
            source,
        }
    }

    /// Check if a fresh query could succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        match self {
            WhoisError::Request { .. } => true,
            WhoisError::InvalidTarget(_)
            | WhoisError::NotConnected
            | WhoisError::AlreadyFinished(_)
            | WhoisError::ConfigRead { .. }
            | WhoisError::ConfigParse(_) => false,
        }
    }
}
