//! Gateway - WebSocket listener that accepts incoming connections.
//!
//! The Gateway binds the listen address, upgrades each TCP stream to a
//! WebSocket and spawns a [`Connection`] task for it. Connection tasks are
//! tracked so shutdown can wait for them to close their sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};

use crate::network::Connection;
use crate::server::Services;

/// How long shutdown waits for open connections to finish closing.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// The Gateway accepts incoming WebSocket connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    services: Arc<Services>,
    shutdown: broadcast::Sender<()>,
}

impl Gateway {
    /// Bind the gateway to the configured listen address.
    pub async fn bind(
        services: Arc<Services>,
        shutdown: broadcast::Sender<()>,
    ) -> anyhow::Result<Self> {
        let addr = services.config.listen.address;
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");
        Ok(Self {
            listener,
            services,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown is signalled, then wait for every
    /// connection task to finish.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(%addr, error = %e, "Failed to set TCP_NODELAY");
                        }
                        let id = self.services.next_connection_id();
                        let services = Arc::clone(&self.services);
                        let shutdown = self.shutdown.subscribe();
                        connections.spawn(async move {
                            match accept_async(stream).await {
                                Ok(ws) => {
                                    debug!(id, %addr, "WebSocket handshake successful");
                                    Connection::new(id, addr, services, ws, shutdown).run().await;
                                }
                                Err(e) => warn!(%addr, error = %e, "WebSocket handshake failed"),
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        error!(error = %e, "Connection task failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!(open = connections.len(), "Gateway shutting down");
                    break;
                }
            }
        }

        drain(connections, DRAIN_DEADLINE).await;
        Ok(())
    }
}

/// Wait for connection tasks to finish, aborting any still running after
/// `deadline`.
async fn drain(mut connections: JoinSet<()>, deadline: Duration) {
    let drained = timeout(deadline, async {
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "Connection task failed");
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(remaining = connections.len(), "Drain deadline passed, aborting connections");
        connections.shutdown().await;
    }
    debug!("All connections closed");
}
