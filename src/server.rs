//! TCP listener that dispatches one session task per connection.
//!
//! The accept loop never blocks on connection work: every accepted socket is
//! handed to its own tokio task running [`run_session`]. A semaphore caps the
//! number of simultaneous sessions; connections beyond the cap are closed
//! immediately rather than queued. On shutdown the listener stops accepting
//! and is released, while in-flight sessions run to natural completion.

use crate::error::{CallguardError, Result};
use crate::session::{SessionContext, run_session};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

/// State for managing server shutdown.
#[derive(Debug, Clone)]
struct ServerState {
    shutdown: Arc<Mutex<bool>>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    async fn is_shutdown(&self) -> bool {
        *self.shutdown.lock().await
    }

    async fn set_shutdown(&self) {
        *self.shutdown.lock().await = true;
    }
}

/// Device-facing TCP server.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    state: ServerState,
    session_limit: Arc<Semaphore>,
    capacity: u32,
}

impl Server {
    /// Binds the listening socket. Bind failure is fatal at startup.
    pub async fn bind(host: &str, port: u16, max_connections: usize) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| CallguardError::Bind {
                addr,
                message: e.to_string(),
            })?;

        Ok(Self {
            listener,
            state: ServerState::new(),
            session_limit: Arc::new(Semaphore::new(max_connections)),
            capacity: u32::try_from(max_connections).unwrap_or(u32::MAX),
        })
    }

    /// The bound local address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until shutdown, spawning a session per connection.
    ///
    /// An accept error terminates the listener only; sessions already running
    /// keep their sockets and finish on their own.
    pub async fn start(&self, ctx: Arc<SessionContext>) -> Result<()> {
        info!(addr = %self.local_addr()?, "listening for device connections");

        loop {
            // Check if shutdown was requested
            if self.state.is_shutdown().await {
                break;
            }

            // Accept connection with timeout to check for shutdown
            let accept_result = tokio::time::timeout(
                tokio::time::Duration::from_millis(100),
                self.listener.accept(),
            )
            .await;

            match accept_result {
                Ok(Ok((stream, peer))) => {
                    let permit = match Arc::clone(&self.session_limit).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!(peer = %peer, "session limit reached, rejecting connection");
                            drop(stream);
                            continue;
                        }
                    };

                    info!(peer = %peer, "connection accepted");
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        let peer = peer.to_string();
                        run_session(stream, peer.clone(), ctx).await;
                        info!(peer = %peer, "connection closed");
                        drop(permit);
                    });
                }
                Ok(Err(e)) => {
                    return Err(CallguardError::Accept {
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    // Timeout - check shutdown flag again
                    continue;
                }
            }
        }

        Ok(())
    }

    /// Stops accepting new connections. In-flight sessions are untouched.
    pub async fn stop(&self) {
        self.state.set_shutdown().await;
    }

    /// Waits until every in-flight session has finished.
    ///
    /// Every session holds one semaphore permit for its lifetime, so the
    /// sessions are all done exactly when the full permit count can be
    /// acquired. Call after the accept loop has ended; otherwise new
    /// connections keep the drain waiting.
    pub async fn drain(&self) {
        // Acquire-and-release; holding the permits is not needed.
        let _all = self.session_limit.acquire_many(self.capacity).await;
    }
}
