//! In-memory match store.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Weak;
use tracing::{debug, info};
use uuid::Uuid;

use super::{MatchId, MatchObserver, MatchStatus, MatchStore, MultiMatch, ProfileId, StoreError};

#[derive(Debug)]
struct MatchEntry {
    record: MultiMatch,
    profiles: BTreeSet<ProfileId>,
}

/// Match records held in a single mutex-guarded map.
#[derive(Default)]
pub struct MemoryMatchStore {
    matches: Mutex<HashMap<MatchId, MatchEntry>>,
    observer: RwLock<Option<Weak<dyn MatchObserver>>>,
    /// Pending simulated conflicts for mutating calls.
    conflicts: AtomicUsize,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the observer notified on deletion. Held weakly.
    pub fn set_observer(&self, observer: Weak<dyn MatchObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// Make the next `count` membership or status updates fail with
    /// [`StoreError::Conflict`], simulating concurrent writers.
    pub fn inject_conflicts(&self, count: usize) {
        self.conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of stored matches.
    pub fn len(&self) -> usize {
        self.matches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.lock().is_empty()
    }

    fn take_conflict(&self, match_id: &str) -> Result<(), StoreError> {
        let injected = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Conflict(match_id.to_string()));
        }
        Ok(())
    }

    fn notify_deleted(&self, match_id: &str) {
        let observer = self.observer.read().as_ref().and_then(Weak::upgrade);
        if let Some(observer) = observer {
            observer.on_match_deleted(match_id);
        }
    }
}

impl std::fmt::Debug for MemoryMatchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMatchStore")
            .field("matches", &self.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MatchStore for MemoryMatchStore {
    async fn create_match(
        &self,
        configuration: &str,
        max_players: usize,
    ) -> Result<MultiMatch, StoreError> {
        let record = MultiMatch {
            id: Uuid::new_v4().to_string(),
            configuration: configuration.to_string(),
            status: MatchStatus::Open,
            max_players,
            created_at: Utc::now().timestamp(),
        };
        self.matches.lock().insert(
            record.id.clone(),
            MatchEntry {
                record: record.clone(),
                profiles: BTreeSet::new(),
            },
        );
        info!(match_id = %record.id, %configuration, "Match created");
        crate::metrics::record_match_created(configuration);
        Ok(record)
    }

    async fn get_match(&self, match_id: &str) -> Result<MultiMatch, StoreError> {
        self.matches
            .lock()
            .get(match_id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| StoreError::MatchNotFound(match_id.to_string()))
    }

    async fn list_matches(&self) -> Result<Vec<MultiMatch>, StoreError> {
        Ok(self
            .matches
            .lock()
            .values()
            .map(|entry| entry.record.clone())
            .collect())
    }

    async fn get_profiles(&self, match_id: &str) -> Result<Vec<ProfileId>, StoreError> {
        self.matches
            .lock()
            .get(match_id)
            .map(|entry| entry.profiles.iter().cloned().collect())
            .ok_or_else(|| StoreError::MatchNotFound(match_id.to_string()))
    }

    async fn add_profile(&self, match_id: &str, profile_id: &str) -> Result<(), StoreError> {
        self.take_conflict(match_id)?;
        let mut matches = self.matches.lock();
        let entry = matches
            .get_mut(match_id)
            .ok_or_else(|| StoreError::MatchNotFound(match_id.to_string()))?;
        entry.profiles.insert(profile_id.to_string());
        Ok(())
    }

    async fn remove_profile(&self, match_id: &str, profile_id: &str) -> Result<usize, StoreError> {
        self.take_conflict(match_id)?;
        let mut matches = self.matches.lock();
        let entry = matches
            .get_mut(match_id)
            .ok_or_else(|| StoreError::MatchNotFound(match_id.to_string()))?;
        entry.profiles.remove(profile_id);
        Ok(entry.profiles.len())
    }

    async fn update_status(&self, match_id: &str, status: MatchStatus) -> Result<(), StoreError> {
        self.take_conflict(match_id)?;
        let mut matches = self.matches.lock();
        let entry = matches
            .get_mut(match_id)
            .ok_or_else(|| StoreError::MatchNotFound(match_id.to_string()))?;
        debug!(%match_id, from = %entry.record.status, to = %status, "Match status changed");
        entry.record.status = status;
        Ok(())
    }

    async fn delete_match(&self, match_id: &str) -> Result<(), StoreError> {
        let removed = self.matches.lock().remove(match_id);
        if removed.is_none() {
            return Err(StoreError::MatchNotFound(match_id.to_string()));
        }
        info!(%match_id, "Match deleted");
        self.notify_deleted(match_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl MatchObserver for Recorder {
        fn on_match_deleted(&self, match_id: &str) {
            self.0.lock().push(match_id.to_string());
        }
    }

    #[tokio::test]
    async fn membership_is_ordered_and_idempotent() {
        let store = MemoryMatchStore::new();
        let m = store.create_match("duel", 2).await.unwrap();
        store.add_profile(&m.id, "b").await.unwrap();
        store.add_profile(&m.id, "a").await.unwrap();
        store.add_profile(&m.id, "a").await.unwrap();
        assert_eq!(store.get_profiles(&m.id).await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.remove_profile(&m.id, "a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_matches_returns_every_record() {
        let store = MemoryMatchStore::new();
        let a = store.create_match("duel", 2).await.unwrap();
        let b = store.create_match("squad", 4).await.unwrap();
        let mut ids: Vec<_> = store
            .list_matches()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn status_updates_persist() {
        let store = MemoryMatchStore::new();
        let m = store.create_match("duel", 2).await.unwrap();
        assert_eq!(m.status, MatchStatus::Open);
        store.update_status(&m.id, MatchStatus::Ended).await.unwrap();
        assert_eq!(store.get_match(&m.id).await.unwrap().status, MatchStatus::Ended);
    }

    #[tokio::test]
    async fn delete_notifies_observer() {
        let store = MemoryMatchStore::new();
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn MatchObserver> = Arc::downgrade(&recorder) as Weak<dyn MatchObserver>;
        store.set_observer(weak);

        let m = store.create_match("duel", 2).await.unwrap();
        store.delete_match(&m.id).await.unwrap();
        assert_eq!(*recorder.0.lock(), vec![m.id.clone()]);
        assert!(matches!(
            store.get_match(&m.id).await,
            Err(StoreError::MatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn injected_conflicts_are_consumed() {
        let store = MemoryMatchStore::new();
        let m = store.create_match("duel", 2).await.unwrap();
        store.inject_conflicts(1);
        assert!(matches!(
            store.add_profile(&m.id, "a").await,
            Err(StoreError::Conflict(_))
        ));
        store.add_profile(&m.id, "a").await.unwrap();
    }
}
