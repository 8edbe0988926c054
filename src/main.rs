/*
 * WHOIS Client
 * Copyright (C) 2025 Akaere Networks
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{Level, debug, info};

use whois_client::config::Cli;
use whois_client::{QueryTarget, WhoisClient};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = args
        .connection_config()
        .context("Failed to load connection settings")?;
    debug!("Connection settings: {:?}", config);

    let target = QueryTarget::new(args.server.clone(), args.port);
    let client = WhoisClient::new(config);
    info!("Querying {} for {}", target, args.query);

    let response = if args.use_async {
        client.lookup_async(&target, &args.query).await?
    } else {
        let blocking_target = target.clone();
        let query = args.query.clone();
        tokio::task::spawn_blocking(move || client.lookup(&blocking_target, &query))
            .await
            .context("Blocking WHOIS query panicked")??
    };

    if let Some(failure) = response.connection_error() {
        bail!(
            "Cannot connect to WHOIS server {} after {} attempts: {}",
            target,
            response.connect_attempts(),
            failure
        );
    }

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(response.raw_data())
        .context("Failed to write response")?;
    stdout.flush()?;

    Ok(())
}
