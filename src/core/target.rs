use std::fmt;

use crate::config::DEFAULT_WHOIS_PORT;
use crate::error::{WhoisError, WhoisResult};

/// WHOIS server a query is sent to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryTarget {
    server: String,
    port: u16,
}

impl QueryTarget {
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
        }
    }

    pub fn with_default_port(server: impl Into<String>) -> Self {
        Self::new(server, DEFAULT_WHOIS_PORT)
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Reject targets that can never be connected to
    pub fn validate(&self) -> WhoisResult<()> {
        if self.server.trim().is_empty() {
            return Err(WhoisError::InvalidTarget(
                "WHOIS server is not defined".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(WhoisError::InvalidTarget(format!(
                "WHOIS server {} has no port",
                self.server
            )));
        }
        Ok(())
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server, self.port)
    }
}
