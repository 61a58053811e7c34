//! First-come, first-served matchmaking.
//!
//! Tickets queue per configuration. As soon as `max_players` tickets wait,
//! the oldest ones are placed into a freshly created match.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{
    HandleHooks, HandlePhase, MatchHandle, MatchListener, MatchRequest, MatchmakingAlgorithm,
    MatchmakingError,
};
use crate::config::ApplicationConfiguration;
use crate::store::{MatchStore, MultiMatch};

struct FifoQueue {
    store: Arc<dyn MatchStore>,
    waiting: Mutex<HashMap<String, Vec<Arc<MatchHandle>>>>,
}

impl FifoQueue {
    fn waiting(&self, configuration: &str) -> usize {
        self.waiting
            .lock()
            .get(configuration)
            .map_or(0, Vec::len)
    }
}

impl HandleHooks for FifoQueue {
    fn on_matching(&self, handle: &Arc<MatchHandle>) {
        let configuration = Arc::clone(handle.configuration());
        let batch = {
            let mut waiting = self.waiting.lock();
            let queue = waiting.entry(configuration.name.clone()).or_default();
            queue.retain(|h| h.phase() == HandlePhase::Matching);
            queue.push(Arc::clone(handle));
            debug!(
                configuration = %configuration.name,
                profile = %handle.profile_id(),
                waiting = queue.len(),
                "Ticket queued"
            );
            if queue.len() >= configuration.max_players {
                Some(queue.drain(..configuration.max_players).collect::<Vec<_>>())
            } else {
                None
            }
        };

        if let Some(batch) = batch {
            tokio::spawn(fill(Arc::clone(&self.store), configuration, batch));
        }
    }

    fn on_terminated(&self, handle: &MatchHandle) {
        let mut waiting = self.waiting.lock();
        if let Some(queue) = waiting.get_mut(&handle.configuration().name) {
            queue.retain(|h| !std::ptr::eq(Arc::as_ptr(h), handle));
        }
    }
}

async fn fill(
    store: Arc<dyn MatchStore>,
    configuration: Arc<ApplicationConfiguration>,
    batch: Vec<Arc<MatchHandle>>,
) {
    let record = match store
        .create_match(&configuration.name, configuration.max_players)
        .await
    {
        Ok(record) => record,
        Err(e) => {
            warn!(configuration = %configuration.name, error = %e, "Failed to create match");
            for handle in batch {
                handle.fail(e.clone().into());
            }
            return;
        }
    };

    // Seat the whole batch before anyone is told MATCHED.
    for handle in &batch {
        if let Err(e) = store.add_profile(&record.id, handle.profile_id()).await {
            debug!(match_id = %record.id, profile = %handle.profile_id(), error = %e, "Seating deferred to set_result");
        }
    }

    for handle in batch {
        match handle.set_result(record.clone()).await {
            Ok(()) => {}
            Err(MatchmakingError::Cancelled) => {
                debug!(match_id = %record.id, profile = %handle.profile_id(), "Ticket cancelled before match");
                if let Err(e) = store.remove_profile(&record.id, handle.profile_id()).await {
                    warn!(match_id = %record.id, profile = %handle.profile_id(), error = %e, "Failed to unseat cancelled ticket");
                }
            }
            Err(e) => {
                warn!(match_id = %record.id, profile = %handle.profile_id(), error = %e, "Failed to place ticket");
            }
        }
    }
}

/// The `fifo` algorithm.
pub struct FifoAlgorithm {
    queue: Arc<FifoQueue>,
}

impl FifoAlgorithm {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self {
            queue: Arc::new(FifoQueue {
                store,
                waiting: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Tickets waiting under `configuration`.
    pub fn waiting(&self, configuration: &str) -> usize {
        self.queue.waiting(configuration)
    }
}

impl MatchmakingAlgorithm for FifoAlgorithm {
    fn name(&self) -> &str {
        "fifo"
    }

    fn find(&self, request: MatchRequest, listener: Arc<dyn MatchListener>) -> Arc<MatchHandle> {
        let hooks: Arc<dyn HandleHooks> = self.queue.clone();
        MatchHandle::new(request, Arc::clone(&self.queue.store), listener, Some(hooks))
    }

    fn join(
        &self,
        request: MatchRequest,
        existing: MultiMatch,
        listener: Arc<dyn MatchListener>,
    ) -> Arc<MatchHandle> {
        let handle = MatchHandle::new(request, Arc::clone(&self.queue.store), listener, None);
        if let Err(e) = handle.start() {
            handle.fail(e);
            return handle;
        }
        let pending = Arc::clone(&handle);
        tokio::spawn(async move {
            if let Err(e) = pending.set_result(existing).await {
                debug!(profile = %pending.profile_id(), error = %e, "Join did not settle");
            }
        });
        handle
    }
}

impl std::fmt::Debug for FifoAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoAlgorithm").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaking::tests::ChannelListener;
    use crate::store::MemoryMatchStore;

    fn request(profile: &str, configuration: &Arc<ApplicationConfiguration>) -> MatchRequest {
        MatchRequest {
            profile_id: profile.into(),
            configuration: Arc::clone(configuration),
        }
    }

    fn squad(max_players: usize) -> Arc<ApplicationConfiguration> {
        Arc::new(ApplicationConfiguration {
            name: "squad".into(),
            algorithm: None,
            max_players,
        })
    }

    #[tokio::test]
    async fn fills_match_when_enough_tickets() {
        let store = Arc::new(MemoryMatchStore::new());
        let fifo = FifoAlgorithm::new(store.clone());
        let configuration = squad(3);

        let mut receivers = Vec::new();
        for p in ["a", "b", "c"] {
            let (listener, rx) = ChannelListener::pair();
            fifo.find(request(p, &configuration), listener).start().unwrap();
            receivers.push(rx);
        }

        let mut ids = Vec::new();
        for rx in &mut receivers {
            ids.push(rx.recv().await.unwrap().unwrap().record.id);
        }
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.get_profiles(&ids[0]).await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(fifo.waiting("squad"), 0);
    }

    #[tokio::test]
    async fn cancelled_ticket_leaves_queue() {
        let store = Arc::new(MemoryMatchStore::new());
        let fifo = FifoAlgorithm::new(store.clone());
        let configuration = squad(2);

        let (listener, _rx) = ChannelListener::pair();
        let a = fifo.find(request("a", &configuration), listener);
        a.start().unwrap();
        assert_eq!(fifo.waiting("squad"), 1);

        assert!(a.cancel());
        assert_eq!(fifo.waiting("squad"), 0);

        let (listener, mut rx_b) = ChannelListener::pair();
        fifo.find(request("b", &configuration), listener).start().unwrap();
        let (listener, mut rx_c) = ChannelListener::pair();
        fifo.find(request("c", &configuration), listener).start().unwrap();

        let b = rx_b.recv().await.unwrap().unwrap();
        let c = rx_c.recv().await.unwrap().unwrap();
        assert_eq!(b.match_id(), c.match_id());
        assert_eq!(store.get_profiles(b.match_id()).await.unwrap(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn join_settles_on_existing_match() {
        let store = Arc::new(MemoryMatchStore::new());
        let fifo = FifoAlgorithm::new(store.clone());
        let record = store.create_match("squad", 2).await.unwrap();
        store.add_profile(&record.id, "a").await.unwrap();

        let (listener, mut rx) = ChannelListener::pair();
        let handle = fifo.join(request("a", &squad(2)), record.clone(), listener);
        let got = rx.recv().await.unwrap().unwrap();
        assert_eq!(got.match_id(), record.id);
        assert_eq!(handle.phase(), HandlePhase::Matched);
    }
}
