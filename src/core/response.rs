use std::borrow::Cow;
use std::fmt;
use std::io;

/// A failed connect attempt: the platform error code, when there is one, and
/// its message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFailure {
    pub errno: Option<i32>,
    pub message: String,
}

impl ConnectionFailure {
    pub fn new(errno: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            errno,
            message: message.into(),
        }
    }
}

impl From<io::Error> for ConnectionFailure {
    fn from(err: io::Error) -> Self {
        Self::new(err.raw_os_error(), err.to_string())
    }
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errno {
            Some(code) => write!(f, "{} (errno {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of one WHOIS query.
///
/// `raw_data` holds the bytes exactly as the server sent them and is only
/// filled after a successful connection. The connection error fields describe
/// the most recent failed attempt, not a history of all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhoisResponse {
    raw_data: Vec<u8>,
    connection_errno: Option<i32>,
    connection_errstr: Option<String>,
    connect_attempts: u32,
}

impl WhoisResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    pub fn into_raw_data(self) -> Vec<u8> {
        self.raw_data
    }

    pub fn is_empty(&self) -> bool {
        self.raw_data.is_empty()
    }

    /// Response decoded for display, with invalid UTF-8 replaced
    pub fn text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw_data)
    }

    pub fn connection_errno(&self) -> Option<i32> {
        self.connection_errno
    }

    pub fn connection_errstr(&self) -> Option<&str> {
        self.connection_errstr.as_deref()
    }

    pub fn has_connection_error(&self) -> bool {
        self.connection_errno.is_some() || self.connection_errstr.is_some()
    }

    pub fn connection_error(&self) -> Option<ConnectionFailure> {
        if !self.has_connection_error() {
            return None;
        }
        Some(ConnectionFailure::new(
            self.connection_errno,
            self.connection_errstr.clone().unwrap_or_default(),
        ))
    }

    /// Number of connect attempts made for this query
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.connect_attempts = self.connect_attempts.saturating_add(1);
        self.connection_errno = None;
        self.connection_errstr = None;
    }

    pub(crate) fn record_failure(&mut self, failure: ConnectionFailure) {
        self.connection_errno = failure.errno;
        self.connection_errstr = Some(failure.message);
    }

    pub(crate) fn set_raw_data(&mut self, data: Vec<u8>) {
        self.raw_data = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_last_failure_is_kept() {
        let mut response = WhoisResponse::new();

        response.begin_attempt();
        response.record_failure(ConnectionFailure::new(Some(111), "Connection refused"));
        response.begin_attempt();
        response.record_failure(ConnectionFailure::new(None, "failed to lookup address"));

        assert_eq!(response.connect_attempts(), 2);
        assert_eq!(response.connection_errno(), None);
        assert_eq!(response.connection_errstr(), Some("failed to lookup address"));
    }

    #[test]
    fn test_new_attempt_clears_previous_failure() {
        let mut response = WhoisResponse::new();
        response.begin_attempt();
        response.record_failure(ConnectionFailure::new(Some(110), "Connection timed out"));
        assert!(response.has_connection_error());

        response.begin_attempt();
        assert!(!response.has_connection_error());
        assert_eq!(response.connection_error(), None);
    }

    #[test]
    fn test_failure_from_io_error() {
        let failure = ConnectionFailure::from(io::Error::from_raw_os_error(111));
        assert_eq!(failure.errno, Some(111));
        assert!(failure.to_string().ends_with("(errno 111)"));

        let failure = ConnectionFailure::from(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        assert_eq!(failure.errno, None);
        assert_eq!(failure.to_string(), "timed out");
    }

    #[test]
    fn test_text_lossy_leaves_raw_data_alone() {
        let mut response = WhoisResponse::new();
        response.set_raw_data(b"caf\xe9\r\n".to_vec());
        assert_eq!(response.text_lossy(), "caf\u{fffd}\r\n");
        assert_eq!(response.raw_data(), b"caf\xe9\r\n");
    }
}
