//! Server assembly.
//!
//! [`Services`] is the per-process dependency container handed to every
//! connection. [`Server::start`] builds it, binds the gateway, starts the
//! abandoned-match reaper and returns a [`ServerHandle`] for shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::matchmaking::MatchmakingRegistry;
use crate::network::Gateway;
use crate::signaling::MatchSignalingService;
use crate::store::{
    MatchObserver, MatchStore, MemoryAccounts, MemoryMatchStore, ProfileDirectory,
    SessionValidator,
};

/// Collaborators shared by all connections.
pub struct Services {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionValidator>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub store: Arc<dyn MatchStore>,
    pub signaling: Arc<MatchSignalingService>,
    pub matchmaking: MatchmakingRegistry,
    next_connection_id: AtomicU64,
}

impl Services {
    /// Services backed by the in-memory collaborators.
    ///
    /// The match store reports deletions to the signaling service.
    pub fn in_memory(config: Config) -> Arc<Self> {
        let accounts = Arc::new(MemoryAccounts::from_config(&config.accounts));
        let matches = Arc::new(MemoryMatchStore::new());
        let store: Arc<dyn MatchStore> = matches.clone();
        let signaling = Arc::new(MatchSignalingService::new(
            Arc::clone(&store),
            config.limits.mailbox_backlog,
        ));
        let observer: Arc<dyn MatchObserver> = signaling.clone();
        matches.set_observer(Arc::downgrade(&observer));

        Self::with_collaborators(config, accounts.clone(), accounts, store, signaling)
    }

    /// Services over caller-supplied collaborators. Wiring deletion
    /// notifications from `store` to `signaling` is up to the caller.
    pub fn with_collaborators(
        config: Config,
        sessions: Arc<dyn SessionValidator>,
        profiles: Arc<dyn ProfileDirectory>,
        store: Arc<dyn MatchStore>,
        signaling: Arc<MatchSignalingService>,
    ) -> Arc<Self> {
        let matchmaking = MatchmakingRegistry::with_builtin(&config.matchmaking, Arc::clone(&store));
        Arc::new(Self {
            config: Arc::new(config),
            sessions,
            profiles,
            store,
            signaling,
            matchmaking,
            next_connection_id: AtomicU64::new(1),
        })
    }

    /// Allocate a connection id, unique for this process.
    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("server", &self.config.server.name)
            .field("signaling", &self.signaling)
            .field("matchmaking", &self.matchmaking)
            .finish_non_exhaustive()
    }
}

/// Entry point for running a server.
#[derive(Debug)]
pub struct Server;

impl Server {
    /// Bind the listener and start accepting connections.
    pub async fn start(config: Config) -> anyhow::Result<ServerHandle> {
        Self::start_with(Services::in_memory(config)).await
    }

    /// Like [`start`](Self::start) with prebuilt services.
    pub async fn start_with(services: Arc<Services>) -> anyhow::Result<ServerHandle> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let gateway = Gateway::bind(Arc::clone(&services), shutdown_tx.clone()).await?;
        let local_addr = gateway.local_addr()?;

        info!(
            server = %services.config.server.name,
            %local_addr,
            "Server started"
        );

        let reaper = tokio::spawn(reap_abandoned(
            Arc::clone(&services),
            shutdown_tx.subscribe(),
        ));
        let task = tokio::spawn(async move {
            if let Err(e) = gateway.run().await {
                error!(error = %e, "Gateway error");
            }
        });

        Ok(ServerHandle {
            local_addr,
            services,
            shutdown: shutdown_tx,
            task,
            reaper,
        })
    }
}

/// Periodically delete matches nobody has been subscribed to for
/// `timeouts.abandoned_match`.
async fn reap_abandoned(services: Arc<Services>, mut shutdown: broadcast::Receiver<()>) {
    let grace = services.config.timeouts.abandoned_match();
    let mut tick = interval((grace / 2).max(Duration::from_secs(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let reaped = services.signaling.reap(grace).await;
                if reaped > 0 {
                    info!(reaped, "Reaped abandoned matches");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    debug!("Match reaper stopped");
}

/// A running server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    services: Arc<Services>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Stop accepting and close every open connection with NORMAL_CLOSURE.
    ///
    /// Returns once every connection task has finished, or after the
    /// gateway's drain deadline has aborted the rest.
    pub async fn shutdown(self) {
        info!("Shutting down");
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "Gateway task failed");
        }
        if let Err(e) = self.reaper.await {
            error!(error = %e, "Match reaper failed");
        }
    }
}
