//! TCP server shell
//!
//! `PondServer` binds the listen socket and accepts connections; each
//! connection runs in its own task against the shared [`Database`].
//! Producers and consumers speak the same framed protocol on the same
//! port (default 5480).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::BrokerConfig;
use crate::connection::Connection;
use crate::database::Database;
use crate::error::BrokerError;

/// The broker server: listener plus shared database
pub struct PondServer {
    config: BrokerConfig,
    database: Arc<Database>,
    listener: TcpListener,
    connections_total: AtomicU64,
}

impl PondServer {
    /// Bind the configured listen address
    pub async fn bind(config: BrokerConfig, database: Arc<Database>) -> io::Result<Self> {
        let bind_addr = config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;

        Ok(Self {
            config,
            database,
            listener,
            connections_total: AtomicU64::new(0),
        })
    }

    /// The address the server actually listens on
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The shared database
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Run the accept loop until cancelled
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BrokerError> {
        info!(
            address = %self.local_addr()?,
            capacity = self.database.capacity(),
            "pond server listening"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            self.connections_total.fetch_add(1, Ordering::Relaxed);

                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(error = %e, "failed to set TCP_NODELAY");
                            }

                            let connection = Connection::new(
                                Arc::clone(&self.database),
                                self.config.clone(),
                                peer,
                            );

                            tokio::spawn(async move {
                                debug!(%peer, "client connected");
                                if let Err(e) = connection.run(stream).await {
                                    debug!(%peer, error = %e, "connection ended");
                                }
                            });
                        }
                        Err(e) => {
                            // Transient accept errors - log and continue
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }

        info!("pond server stopped");
        Ok(())
    }

    /// Start the server in a background task
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<Result<(), BrokerError>> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

#[cfg(test)]
#[path = "server_unit_test.rs"]
mod tests;
