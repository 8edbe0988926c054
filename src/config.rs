use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{WhoisError, WhoisResult};

// WHOIS protocol constants
pub const IANA_WHOIS_SERVER: &str = "whois.iana.org";
pub const DEFAULT_WHOIS_PORT: u16 = 43;

// Connection defaults
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 0;
pub const DEFAULT_RETRY_SLEEP_SECS: u64 = 1;

/// Connection settings for a single WHOIS query.
///
/// A timeout of `0` disables that deadline: the connect call blocks until the OS
/// gives up, and reads block until the peer closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Deadline for establishing the TCP connection, per attempt
    pub connect_timeout_secs: u64,
    /// Read/write deadline on an open connection
    pub stream_timeout_secs: u64,
    /// Retries after the first failed attempt (`0` means exactly one attempt)
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub retry_sleep_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_sleep_secs: DEFAULT_RETRY_SLEEP_SECS,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_stream_timeout(mut self, secs: u64) -> Self {
        self.stream_timeout_secs = secs;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_sleep(mut self, secs: u64) -> Self {
        self.retry_sleep_secs = secs;
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.connect_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.stream_timeout_secs)
    }

    pub fn retry_sleep(&self) -> Duration {
        Duration::from_secs(self.retry_sleep_secs)
    }

    /// Total number of connect attempts a query will make before giving up
    pub fn total_attempts(&self) -> u64 {
        u64::from(self.max_retries) + 1
    }

    /// Delay to wait before the given attempt (0-indexed).
    ///
    /// The first attempt never waits; every later one waits the same fixed amount.
    pub fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            None
        } else {
            Some(self.retry_sleep())
        }
    }

    /// Upper bound on the wall-clock time of one query, or `None` when a
    /// deadline is disabled.
    pub fn worst_case_duration(&self) -> Option<Duration> {
        let connect = self.connect_timeout()?;
        let stream = self.stream_timeout()?;
        let attempts = u32::try_from(self.total_attempts()).unwrap_or(u32::MAX);

        connect
            .checked_mul(attempts)?
            .checked_add(self.retry_sleep().checked_mul(self.max_retries)?)?
            .checked_add(stream)
    }

    pub fn from_toml_str(contents: &str) -> WhoisResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> WhoisResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| WhoisError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "A minimal WHOIS client")]
pub struct Cli {
    /// Query string sent to the server
    pub query: String,

    /// WHOIS server to query
    #[arg(short, long, default_value = IANA_WHOIS_SERVER)]
    pub server: String,

    /// WHOIS server port
    #[arg(short, long, default_value_t = DEFAULT_WHOIS_PORT)]
    pub port: u16,

    /// TOML file with connection settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Connect timeout in seconds (0 disables it)
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Read/write timeout in seconds (0 disables it)
    #[arg(long)]
    pub stream_timeout: Option<u64>,

    /// Connect retries after the first failed attempt
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// Seconds to sleep between connect attempts
    #[arg(long)]
    pub retry_sleep: Option<u64>,

    /// Use the tokio-based client instead of blocking sockets
    #[arg(long = "async")]
    pub use_async: bool,

    /// Enable debug output
    #[arg(short, long)]
    pub debug: bool,

    /// Enable trace output (extremely verbose)
    #[arg(short, long)]
    pub trace: bool,
}

impl Cli {
    /// Connection settings from the config file (if any), overridden by flags
    pub fn connection_config(&self) -> WhoisResult<ConnectionConfig> {
        let mut config = match &self.config {
            Some(path) => ConnectionConfig::load_from_file(path)?,
            None => ConnectionConfig::default(),
        };

        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.stream_timeout {
            config.stream_timeout_secs = secs;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(secs) = self.retry_sleep {
            config.retry_sleep_secs = secs;
        }

        Ok(config)
    }
}
