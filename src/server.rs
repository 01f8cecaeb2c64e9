//! TCP server for bank transaction requests.
//!
//! Every accepted connection gets its own task that reads one request,
//! executes it against the shared ledger, writes the response and closes.
//! Connection tasks are owned by the server so that shutdown can wait for
//! them instead of leaving detached work behind.

use crate::command::Command;
use crate::config::ServerConfig;
use crate::error::ProtocolError;
use crate::executor::{execute, INVALID_REQUEST};
use crate::ledger::Ledger;
use crate::protocol::{read_request_head, Response};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

/// Server instance
pub struct Server {
    config: ServerConfig,
    ledger: Arc<Ledger>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance with an empty ledger
    pub fn new(config: ServerConfig) -> Self {
        Self::with_ledger(config, Ledger::new())
    }

    /// Create a server around an existing ledger
    pub fn with_ledger(config: ServerConfig, ledger: Arc<Ledger>) -> Self {
        let connection_limit = Arc::new(Semaphore::new(config.max_connections));
        Server {
            config,
            ledger,
            connection_limit,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Accept connections until `shutdown` resolves, then wait for in-flight
    /// connections to finish and return the shutdown future's output.
    pub async fn run_until<F>(&self, listener: TcpListener, shutdown: F) -> F::Output
    where
        F: Future,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Server listening");
        }

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        let output = loop {
            while let Some(finished) = connections.try_join_next() {
                log_join_error(finished);
            }

            // Wait for a connection slot
            let permit = tokio::select! {
                output = &mut shutdown => break output,
                permit = Arc::clone(&self.connection_limit).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                error!("Connection limiter closed, no longer accepting");
                break (&mut shutdown).await;
            };

            let accepted = tokio::select! {
                output = &mut shutdown => break output,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New connection");

                    let ledger = Arc::clone(&self.ledger);
                    let read_timeout = self.config.read_timeout;

                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, &ledger, read_timeout).await {
                            debug!(peer = %peer, error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        };

        info!(in_flight = connections.len(), "Shutting down, draining connections");
        while let Some(finished) = connections.join_next().await {
            log_join_error(finished);
        }
        info!(accounts = self.ledger.len(), "Server stopped");

        output
    }
}

fn log_join_error(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Connection task panicked");
        }
    }
}

/// Bind a listening socket with address reuse enabled.
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    TcpListener::from_std(socket.into())
}

/// Handle a single client connection: one request, one response.
///
/// Request lines the framer rejects get a `404 Not Found` before the
/// connection is closed; the error is still returned for logging.
pub async fn handle_connection<S>(
    stream: S,
    ledger: &Ledger,
    read_timeout: Option<Duration>,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);

    let head = match read_timeout {
        Some(limit) => tokio::time::timeout(limit, read_request_head(&mut stream))
            .await
            .unwrap_or(Err(ProtocolError::ReadTimeout(limit))),
        None => read_request_head(&mut stream).await,
    };

    let response = match head {
        Ok(Some(request)) => {
            let command = Command::parse(&request.target);
            trace!(command = command.name(), ?command, "Processing command");
            Response::ok(execute(&command, ledger))
        }
        Ok(None) => {
            trace!("Connection closed by client");
            return Ok(());
        }
        Err(
            e @ (ProtocolError::UnsupportedMethod(_)
            | ProtocolError::MalformedRequestLine(_)
            | ProtocolError::HeadTooLarge(_)),
        ) => {
            warn!(error = %e, "Rejecting request");
            stream
                .write_all(&Response::not_found(INVALID_REQUEST).encode())
                .await?;
            stream.shutdown().await?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    stream.write_all(&response.encode()).await?;
    stream.shutdown().await?;
    Ok(())
}
