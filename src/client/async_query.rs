use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::{QueryState, READ_BUFFER_SIZE, is_deadline, request_line};
use crate::config::ConnectionConfig;
use crate::core::{ConnectionFailure, QueryTarget, WhoisResponse};
use crate::error::{WhoisError, WhoisResult};

/// A single WHOIS query over a tokio TCP stream.
///
/// Same lifecycle as [`WhoisQuery`](super::WhoisQuery), with deadlines
/// enforced by `tokio::time::timeout` and the retry delay by
/// `tokio::time::sleep`.
#[derive(Debug)]
pub struct AsyncWhoisQuery {
    target: QueryTarget,
    config: ConnectionConfig,
    state: QueryState,
    stream: Option<TcpStream>,
    response: WhoisResponse,
}

impl AsyncWhoisQuery {
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

    pub async fn connect(&mut self) -> WhoisResult<()> {
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
                tokio::time::sleep(delay).await;
            }

            self.response.begin_attempt();
            debug!("Connecting to WHOIS server {} (attempt {})", self.target, attempt + 1);

            match open_stream(&self.target, &self.config).await {
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

    pub async fn perform_request(&mut self, query_line: &str) -> WhoisResult<()> {
        let Some(mut stream) = self.stream.take() else {
            return Err(WhoisError::NotConnected);
        };

        self.state = QueryState::Requesting;
        let result = exchange(&mut stream, &self.target, &self.config, query_line).await;
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

/// Run `future` under an optional deadline, mapping expiry to `TimedOut`
async fn with_deadline<T, F>(deadline: Option<Duration>, future: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed"))),
        None => future.await,
    }
}

async fn open_stream(
    target: &QueryTarget,
    config: &ConnectionConfig,
) -> Result<TcpStream, ConnectionFailure> {
    let connect = TcpStream::connect((target.server(), target.port()));
    let stream = with_deadline(config.connect_timeout(), connect).await?;

    // Try to disable Nagle's algorithm
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }
    Ok(stream)
}

async fn exchange(
    stream: &mut TcpStream,
    target: &QueryTarget,
    config: &ConnectionConfig,
    query_line: &str,
) -> WhoisResult<Vec<u8>> {
    let request = request_line(query_line);
    with_deadline(config.stream_timeout(), async {
        stream.write_all(&request).await?;
        stream.flush().await
    })
    .await
    .map_err(|e| WhoisError::request(target.to_string(), e))?;

    read_until_close(stream, target, config.stream_timeout()).await
}

async fn read_until_close<R>(
    reader: &mut R,
    target: &QueryTarget,
    deadline: Option<Duration>,
) -> WhoisResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        match with_deadline(deadline, reader.read(&mut buffer)).await {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_server::{
        refused_port, spawn_late_responder, spawn_responder, spawn_staller,
    };
    use std::time::Instant;

    fn local(port: u16) -> QueryTarget {
        QueryTarget::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_end_to_end_response() {
        let server = spawn_responder(b"Domain Name: EXAMPLE.COM\r\n");
        let mut query = AsyncWhoisQuery::new(local(server.port), ConnectionConfig::new());

        query.connect().await.unwrap();
        assert_eq!(query.state(), QueryState::Connected);
        query.perform_request("example.com").await.unwrap();

        assert_eq!(query.state(), QueryState::Completed);
        assert_eq!(query.response().raw_data(), b"Domain Name: EXAMPLE.COM\r\n");
        assert_eq!(server.request(), b"example.com\r\n");
    }

    #[tokio::test]
    async fn test_silent_server_yields_empty_response() {
        let server = spawn_staller(b"");
        let config = ConnectionConfig::new().with_stream_timeout(1);
        let mut query = AsyncWhoisQuery::new(local(server.port), config);

        query.connect().await.unwrap();
        let started = Instant::now();
        query.perform_request("example.com").await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(900));
        assert!(query.response().is_empty());
        assert_eq!(query.state(), QueryState::Completed);
    }

    #[tokio::test]
    async fn test_refused_connection_retries() {
        let config = ConnectionConfig::new().with_max_retries(2).with_retry_sleep(1);
        let mut query = AsyncWhoisQuery::new(local(refused_port()), config);

        let started = Instant::now();
        query.connect().await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(!query.is_connected());
        assert_eq!(query.state(), QueryState::Failed);
        assert_eq!(query.response().connect_attempts(), 3);

        let errno = query.response().connection_errno().unwrap();
        assert_eq!(
            io::Error::from_raw_os_error(errno).kind(),
            io::ErrorKind::ConnectionRefused
        );
    }

    #[tokio::test]
    async fn test_retry_then_success_clears_error() {
        let server = spawn_late_responder(Duration::from_millis(1500), b"ok\r\n");
        let config = ConnectionConfig::new().with_max_retries(4).with_retry_sleep(1);
        let mut query = AsyncWhoisQuery::new(local(server.port), config);

        query.connect().await.unwrap();
        assert!(query.is_connected());
        let attempts = query.response().connect_attempts();
        assert!((2..5).contains(&attempts), "made {} attempts", attempts);
        assert!(!query.response().has_connection_error());

        query.perform_request("example.com").await.unwrap();
        assert_eq!(query.response().raw_data(), b"ok\r\n");
        assert_eq!(server.request(), b"example.com\r\n");
    }

    #[tokio::test]
    async fn test_invalid_target_and_missing_connection() {
        let mut query = AsyncWhoisQuery::new(QueryTarget::new("", 43), ConnectionConfig::new());
        assert!(matches!(
            query.connect().await,
            Err(WhoisError::InvalidTarget(_))
        ));
        assert_eq!(query.response().connect_attempts(), 0);

        assert!(matches!(
            query.perform_request("example.com").await,
            Err(WhoisError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_deadline_maps_to_timed_out() {
        let pending = std::future::pending::<io::Result<()>>();
        let err = with_deadline(Some(Duration::from_millis(50)), pending)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_reads_until_peer_closes() {
        let mut reader = closing_reader();
        let data = read_until_close(&mut reader, &local(43), None).await.unwrap();
        assert_eq!(data, b"% partial");
    }

    fn closing_reader() -> impl AsyncRead + Unpin {
        let (client, mut server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            server.write_all(b"% partial").await.unwrap();
        });
        client
    }
}
