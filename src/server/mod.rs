//! HTTP ingress server
//!
//! Accepts uploads and hands them to the queue. The server never talks to the
//! upstream; a client gets its answer as soon as the entry is queued.
//!
//! # Example
//!
//! ```no_run
//! use album_relay::dead_letter::DeadLetterStore;
//! use album_relay::queue::EntryQueue;
//! use album_relay::server::{AppState, RelayServer};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState {
//!     queue: Arc::new(EntryQueue::new(300)),
//!     dead_letters: Arc::new(DeadLetterStore::new(100)),
//!     enqueue_timeout: None,
//! };
//! let server = RelayServer::bind("127.0.0.1:0", state).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod handlers;
pub mod response;

use crate::dead_letter::DeadLetterStore;
use crate::queue::EntryQueue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// State shared by every ingress connection
pub struct AppState {
    pub queue: Arc<EntryQueue>,
    pub dead_letters: Arc<DeadLetterStore>,
    /// Longest an upload waits for a queue slot; `None` waits forever
    pub enqueue_timeout: Option<Duration>,
}

/// Ingress HTTP server
pub struct RelayServer {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl RelayServer {
    /// Bind to `address` immediately. Port 0 lets the OS pick.
    pub async fn bind(address: &str, state: AppState) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        Ok(Self {
            state: Arc::new(state),
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Serve until the process exits
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves
    ///
    /// Each connection runs in its own task; connection errors are logged
    /// and never stop the accept loop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Listening on {}", self.local_addr);
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Ingress server stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handlers::handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}
