// WHOIS Client
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # WHOIS Client Library
//!
//! A minimal RFC 3912 WHOIS client:
//! - Connects over plain TCP (port 43 by default) with a bounded, fixed-delay
//!   retry loop
//! - Sends a single CRLF-terminated query line
//! - Reads until the server closes the connection or the stream deadline elapses
//! - Returns the raw bytes untouched, plus the last connection error if no
//!   connection could be made
//!
//! Picking the right server and parsing the answer are left to the caller.
//!
//! ## Quick Start
//!
//! ```no_run
//! use whois_client::{ConnectionConfig, QueryTarget, WhoisClient};
//!
//! fn main() -> anyhow::Result<()> {
//!     let client = WhoisClient::new(ConnectionConfig::new().with_max_retries(2));
//!     let target = QueryTarget::with_default_port("whois.verisign-grs.com");
//!
//!     let response = client.lookup(&target, "example.com")?;
//!     match response.connection_error() {
//!         Some(failure) => eprintln!("could not connect: {}", failure),
//!         None => print!("{}", response.text_lossy()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Step by step
//!
//! Exhausting every connect attempt is not an error. Check
//! [`WhoisQuery::is_connected`] after [`WhoisQuery::connect`]:
//!
//! ```no_run
//! use whois_client::{ConnectionConfig, QueryTarget, WhoisQuery};
//!
//! # fn main() -> whois_client::WhoisResult<()> {
//! let mut query = WhoisQuery::new(
//!     QueryTarget::new("whois.ripe.net", 43),
//!     ConnectionConfig::default(),
//! );
//! query.connect()?;
//! if query.is_connected() {
//!     query.perform_request("AS3333")?;
//! }
//! let response = query.into_response();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod error;

pub use client::{AsyncWhoisQuery, QueryState, WhoisClient, WhoisQuery};
pub use config::ConnectionConfig;
pub use self::core::{ConnectionFailure, QueryTarget, WhoisResponse};
pub use error::{WhoisError, WhoisResult};

/// Query `server` on port 43 with the default connection settings
///
/// # Examples
///
/// ```no_run
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let response = whois_client::query("whois.iana.org", "rs").await?;
///     print!("{}", response.text_lossy());
///     Ok(())
/// }
/// ```
pub async fn query(server: &str, query_line: &str) -> WhoisResult<WhoisResponse> {
    WhoisClient::default()
        .lookup_async(&QueryTarget::with_default_port(server), query_line)
        .await
}
