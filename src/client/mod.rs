//! WHOIS query lifecycle: connect with bounded retries, send one request line,
//! read until the server closes or the stream deadline elapses.

mod async_query;
mod blocking;
#[cfg(test)]
mod test_server;

use std::fmt;
use std::io;

use crate::config::ConnectionConfig;
use crate::core::{QueryTarget, WhoisResponse};
use crate::error::WhoisResult;

pub use async_query::AsyncWhoisQuery;
pub use blocking::WhoisQuery;

const READ_BUFFER_SIZE: usize = 8192;

/// Where a query is in its lifecycle.
///
/// `Completed` and `Failed` are terminal; a query is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Connecting,
    Connected,
    Requesting,
    Completed,
    Failed,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::Completed | QueryState::Failed)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Idle => "idle",
            QueryState::Connecting => "connecting",
            QueryState::Connected => "connected",
            QueryState::Requesting => "requesting",
            QueryState::Completed => "completed",
            QueryState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runs one-shot WHOIS queries with a shared [`ConnectionConfig`].
///
/// The client holds no sockets; every query owns its own connection, so a
/// single client can be cloned into as many threads or tasks as needed.
#[derive(Debug, Clone, Default)]
pub struct WhoisClient {
    config: ConnectionConfig,
}

impl WhoisClient {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Start a blocking query against `target`
    pub fn query(&self, target: QueryTarget) -> WhoisQuery {
        WhoisQuery::new(target, self.config.clone())
    }

    /// Start a tokio-based query against `target`
    pub fn async_query(&self, target: QueryTarget) -> AsyncWhoisQuery {
        AsyncWhoisQuery::new(target, self.config.clone())
    }

    /// Connect, send `query_line` and collect the response.
    ///
    /// When every connect attempt fails this still returns `Ok`, with empty raw
    /// data and the last attempt's error recorded on the response.
    pub fn lookup(&self, target: &QueryTarget, query_line: &str) -> WhoisResult<WhoisResponse> {
        let mut query = self.query(target.clone());
        query.connect()?;
        if query.is_connected() {
            query.perform_request(query_line)?;
        }
        Ok(query.into_response())
    }

    /// Async counterpart of [`lookup`](Self::lookup)
    pub async fn lookup_async(
        &self,
        target: &QueryTarget,
        query_line: &str,
    ) -> WhoisResult<WhoisResponse> {
        let mut query = self.async_query(target.clone());
        query.connect().await?;
        if query.is_connected() {
            query.perform_request(query_line).await?;
        }
        Ok(query.into_response())
    }
}

/// WHOIS servers expect CRLF-terminated queries
fn request_line(query_line: &str) -> Vec<u8> {
    let mut request = Vec::with_capacity(query_line.len() + 2);
    request.extend_from_slice(query_line.as_bytes());
    request.extend_from_slice(b"\r\n");
    request
}

/// Read errors that mean the stream deadline elapsed rather than a broken
/// connection
fn is_deadline(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
