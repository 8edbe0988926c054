use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{QueryState, READ_BUFFER_SIZE, is_deadline, request_line};
use crate::config::ConnectionConfig;
use crate::core::{ConnectionFailure, QueryTarget, WhoisResponse};
use crate::error::{WhoisError, WhoisResult};

/// A single WHOIS query over a blocking TCP socket.
///
/// The query owns its socket: it is opened by [`connect`](Self::connect),
/// consumed by [`perform_request`](Self::perform_request) and closed when the
/// query finishes or is dropped.
#[derive(Debug)]
pub struct WhoisQuery {
    target: QueryTarget,
    config: ConnectionConfig,
    state: QueryState,
    stream: Option<TcpStream>,
    response: WhoisResponse,
}

impl WhoisQuery {
    pub fn new(target: QueryTarget, config: ConnectionConfig) -> Self {
        Self {
            target,
            config,
            state: QueryState::Idle,
            stream: None,
            response: WhoisResponse::new(),
        }
    }

    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn response(&self) -> &WhoisResponse {
        &self.response
    }

    pub fn into_response(self) -> WhoisResponse {
        self.response
    }

    /// Open the connection, retrying up to `max_retries` times.
    ///
    /// Running out of attempts is not an error: the query ends up `Failed`
    /// with the last attempt's error on the response, and
    /// [`is_connected`](Self::is_connected) returns `false`.
    pub fn connect(&mut self) -> WhoisResult<()> {
        if self.state.is_terminal() {
            return Err(WhoisError::AlreadyFinished(self.state));
        }
        if self.is_connected() {
            return Ok(());
        }
        self.target.validate()?;

        self.state = QueryState::Connecting;
        let mut attempt: u32 = 0;
        loop {
            if let Some(delay) = self.config.retry_delay(attempt) {
                debug!("Sleeping {:?} before retrying {}", delay, self.target);
                thread::sleep(delay);
            }

            self.response.begin_attempt();
            debug!("Connecting to WHOIS server {} (attempt {})", self.target, attempt + 1);

            match open_stream(&self.target, &self.config) {
                Ok(stream) => {
                    debug!("Connected to WHOIS server {}", self.target);
                    self.stream = Some(stream);
                    self.state = QueryState::Connected;
                    return Ok(());
                }
                Err(failure) => {
                    warn!("Cannot connect to WHOIS server {}: {}", self.target, failure);
                    self.response.record_failure(failure);
                }
            }

            if attempt >= self.config.max_retries {
                break;
            }
            attempt += 1;
        }

        debug!(
            "Giving up on WHOIS server {} after {} attempts",
            self.target,
            self.response.connect_attempts()
        );
        self.state = QueryState::Failed;
        Ok(())
    }

    /// Send `query_line` and read the response until the server closes the
    /// connection or the stream deadline elapses.
    ///
    /// The socket is closed before this returns, whatever the outcome.
    pub fn perform_request(&mut self, query_line: &str) -> WhoisResult<()> {
        let Some(mut stream) = self.stream.take() else {
            return Err(WhoisError::NotConnected);
        };

        self.state = QueryState::Requesting;
        let result = exchange(&mut stream, &self.target, query_line);
        drop(stream);

        match result {
            Ok(data) => {
                debug!("Received {} bytes from {}", data.len(), self.target);
                self.response.set_raw_data(data);
                self.state = QueryState::Completed;
                Ok(())
            }
            Err(e) => {
                self.state = QueryState::Failed;
                Err(e)
            }
        }
    }
}

/// One connect attempt. Name resolution and every resolved address share a
/// single `connect_timeout` budget.
fn open_stream(
    target: &QueryTarget,
    config: &ConnectionConfig,
) -> Result<TcpStream, ConnectionFailure> {
    let deadline = config.connect_timeout().map(|timeout| Instant::now() + timeout);

    let addrs = resolve(target, deadline)?;
    if addrs.is_empty() {
        return Err(ConnectionFailure::new(
            None,
            format!("No addresses found for {}", target),
        ));
    }

    let stream = connect_any(&addrs, deadline)?;
    prepare_stream(&stream, config)?;
    Ok(stream)
}

fn resolve(target: &QueryTarget, deadline: Option<Instant>) -> io::Result<Vec<SocketAddr>> {
    if let Ok(ip) = target.server().parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, target.port())]);
    }

    let Some(deadline) = deadline else {
        return Ok((target.server(), target.port()).to_socket_addrs()?.collect());
    };

    // The system resolver has no timeout of its own
    let (tx, rx) = mpsc::channel();
    let host = target.server().to_string();
    let port = target.port();
    thread::spawn(move || {
        let resolved = (host.as_str(), port)
            .to_socket_addrs()
            .map(|addrs| addrs.collect::<Vec<_>>());
        let _ = tx.send(resolved);
    });

    match rx.recv_timeout(remaining(deadline)?) {
        Ok(resolved) => resolved,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(deadline_elapsed()),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(io::Error::other(format!(
            "Name resolution for {} was aborted",
            target
        ))),
    }
}

/// Try each address in order until one accepts, giving every connect only
/// what is left of the deadline
fn connect_any(addrs: &[SocketAddr], deadline: Option<Instant>) -> io::Result<TcpStream> {
    let mut last_error = None;

    for addr in addrs {
        let connected = match deadline {
            Some(deadline) => match remaining(deadline) {
                Ok(timeout) => TcpStream::connect_timeout(addr, timeout),
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            },
            None => TcpStream::connect(addr),
        };
        match connected {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connection to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "No addresses to connect to")))
}

fn remaining(deadline: Instant) -> io::Result<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or_else(deadline_elapsed)
}

fn deadline_elapsed() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "Connect deadline elapsed")
}

fn prepare_stream(stream: &TcpStream, config: &ConnectionConfig) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(config.stream_timeout())?;
    stream.set_write_timeout(config.stream_timeout())?;

    // Try to disable Nagle's algorithm
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }
    Ok(())
}

fn exchange(stream: &mut TcpStream, target: &QueryTarget, query_line: &str) -> WhoisResult<Vec<u8>> {
    stream
        .write_all(&request_line(query_line))
        .and_then(|_| stream.flush())
        .map_err(|e| WhoisError::request(target.to_string(), e))?;

    read_until_close(stream, target)
}

fn read_until_close<R: Read>(reader: &mut R, target: &QueryTarget) -> WhoisResult<Vec<u8>> {
    let mut data = Vec::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => data.extend_from_slice(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_deadline(&e) => {
                debug!(
                    "Read deadline elapsed after {} bytes from {}",
                    data.len(),
                    target
                );
                break;
            }
            Err(e) if !data.is_empty() => {
                warn!(
                    "Read from {} failed after {} bytes, keeping partial response: {}",
                    target,
                    data.len(),
                    e
                );
                break;
            }
            Err(e) => return Err(WhoisError::request(target.to_string(), e)),
        }
    }

    Ok(data)
}
