//! Match handle: the state machine of one matchmaking attempt.
//!
//! ```text
//! READY -> MATCHING -> MATCHED
//!   \         \          \
//!    +---------+----------+--> TERMINATED
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{MatchListener, MatchRequest, MatchmakingError, MultiMatchRecord};
use crate::config::ApplicationConfiguration;
use crate::store::{MatchStatus, MatchStore, MultiMatch, StoreError};

/// Attempts for a store mutation on the leave and status paths.
const STORE_ATTEMPTS: u32 = 3;
const STORE_BACKOFF: Duration = Duration::from_millis(20);

/// Phase of a [`MatchHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlePhase {
    Ready,
    Matching,
    Matched,
    Terminated,
}

impl fmt::Display for HandlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandlePhase::Ready => "ready",
            HandlePhase::Matching => "matching",
            HandlePhase::Matched => "matched",
            HandlePhase::Terminated => "terminated",
        })
    }
}

/// Algorithm callbacks for handle transitions.
pub trait HandleHooks: Send + Sync {
    /// The handle entered MATCHING.
    fn on_matching(&self, handle: &Arc<MatchHandle>);
    /// The handle was cancelled while MATCHING.
    fn on_terminated(&self, handle: &MatchHandle);
}

#[derive(Debug)]
struct HandleState {
    phase: HandlePhase,
    record: Option<MultiMatch>,
}

/// One profile's matchmaking attempt and, once matched, its membership.
pub struct MatchHandle {
    request: MatchRequest,
    state: Mutex<HandleState>,
    hooks: Option<Arc<dyn HandleHooks>>,
    store: Arc<dyn MatchStore>,
    listener: Arc<dyn MatchListener>,
}

impl MatchHandle {
    pub fn new(
        request: MatchRequest,
        store: Arc<dyn MatchStore>,
        listener: Arc<dyn MatchListener>,
        hooks: Option<Arc<dyn HandleHooks>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            request,
            state: Mutex::new(HandleState {
                phase: HandlePhase::Ready,
                record: None,
            }),
            hooks,
            store,
            listener,
        })
    }

    #[inline]
    pub fn profile_id(&self) -> &str {
        &self.request.profile_id
    }

    #[inline]
    pub fn configuration(&self) -> &Arc<ApplicationConfiguration> {
        &self.request.configuration
    }

    pub fn phase(&self) -> HandlePhase {
        self.state.lock().phase
    }

    /// Match this handle settled on, while MATCHED.
    pub fn match_id(&self) -> Option<String> {
        let state = self.state.lock();
        match state.phase {
            HandlePhase::Matched => state.record.as_ref().map(|r| r.id.clone()),
            _ => None,
        }
    }

    /// READY -> MATCHING.
    pub fn start(self: &Arc<Self>) -> Result<(), MatchmakingError> {
        {
            let mut state = self.state.lock();
            if state.phase != HandlePhase::Ready {
                return Err(MatchmakingError::InvalidState {
                    op: "start",
                    phase: state.phase,
                });
            }
            state.phase = HandlePhase::Matching;
        }
        if let Some(hooks) = &self.hooks {
            hooks.on_matching(self);
        }
        Ok(())
    }

    /// MATCHING -> MATCHED on `record`.
    ///
    /// Membership is persisted before the transition. If the handle was
    /// cancelled meanwhile, the membership is rolled back and
    /// [`MatchmakingError::Cancelled`] returned. On success the listener gets
    /// the record; on a store failure it gets the error.
    pub async fn set_result(self: &Arc<Self>, record: MultiMatch) -> Result<(), MatchmakingError> {
        match self.phase() {
            HandlePhase::Matching => {}
            HandlePhase::Terminated => return Err(MatchmakingError::Cancelled),
            phase => {
                return Err(MatchmakingError::InvalidState {
                    op: "set result on",
                    phase,
                });
            }
        }

        if let Err(e) = self.store.add_profile(&record.id, self.profile_id()).await {
            let err = MatchmakingError::from(e);
            self.fail(err.clone());
            return Err(err);
        }

        let cancelled = {
            let mut state = self.state.lock();
            if state.phase == HandlePhase::Terminated {
                true
            } else {
                state.phase = HandlePhase::Matched;
                state.record = Some(record.clone());
                false
            }
        };
        if cancelled {
            debug!(match_id = %record.id, profile = %self.profile_id(), "Cancelled during match, rolling back");
            if let Err(e) = self.remove_membership(&record.id).await {
                warn!(match_id = %record.id, error = %e, "Failed to roll back membership");
            }
            return Err(MatchmakingError::Cancelled);
        }

        info!(match_id = %record.id, profile = %self.profile_id(), "Matched");
        self.listener.on_matched(MultiMatchRecord {
            record,
            configuration: Arc::clone(self.configuration()),
            handle: Arc::clone(self),
        });
        Ok(())
    }

    /// Terminate with `error` and report it to the listener, unless already
    /// terminated.
    pub fn fail(&self, error: MatchmakingError) {
        let was = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.phase, HandlePhase::Terminated)
        };
        match was {
            HandlePhase::Terminated => {}
            HandlePhase::Matching => {
                if let Some(hooks) = &self.hooks {
                    hooks.on_terminated(self);
                }
                self.listener.on_failed(error);
            }
            _ => self.listener.on_failed(error),
        }
    }

    /// Stop a pending attempt. Returns whether anything was cancelled.
    pub fn cancel(&self) -> bool {
        let was = {
            let mut state = self.state.lock();
            match state.phase {
                HandlePhase::Ready | HandlePhase::Matching => {
                    std::mem::replace(&mut state.phase, HandlePhase::Terminated)
                }
                _ => return false,
            }
        };
        if was == HandlePhase::Matching {
            debug!(profile = %self.profile_id(), "Matchmaking cancelled");
            if let Some(hooks) = &self.hooks {
                hooks.on_terminated(self);
            }
        }
        true
    }

    /// Leave the match, or cancel the attempt if still matching.
    ///
    /// From MATCHED the profile is removed; when nobody remains the match is
    /// marked ENDED. TERMINATED is a no-op.
    pub async fn leave(&self) -> Result<(), MatchmakingError> {
        let match_id = {
            let mut state = self.state.lock();
            match state.phase {
                HandlePhase::Matched => {
                    state.phase = HandlePhase::Terminated;
                    state.record.as_ref().map(|r| r.id.clone())
                }
                HandlePhase::Terminated => return Ok(()),
                HandlePhase::Ready | HandlePhase::Matching => None,
            }
        };

        let Some(match_id) = match_id else {
            self.cancel();
            return Ok(());
        };

        let remaining = self.remove_membership(&match_id).await?;
        info!(%match_id, profile = %self.profile_id(), remaining, "Left match");
        if remaining == 0 {
            retry("end match", || {
                self.store.update_status(&match_id, MatchStatus::Ended)
            })
            .await?;
            info!(%match_id, "Match ended, no players left");
        }
        Ok(())
    }

    pub async fn open_match(&self) -> Result<(), MatchmakingError> {
        self.set_status("open", MatchStatus::Open).await
    }

    pub async fn close_match(&self) -> Result<(), MatchmakingError> {
        self.set_status("close", MatchStatus::Closed).await
    }

    pub async fn end_match(&self) -> Result<(), MatchmakingError> {
        self.set_status("end", MatchStatus::Ended).await
    }

    async fn set_status(&self, op: &'static str, status: MatchStatus) -> Result<(), MatchmakingError> {
        let match_id = {
            let state = self.state.lock();
            match (state.phase, &state.record) {
                (HandlePhase::Matched, Some(record)) => record.id.clone(),
                (phase, _) => return Err(MatchmakingError::InvalidState { op, phase }),
            }
        };
        retry(op, || self.store.update_status(&match_id, status)).await?;
        info!(%match_id, %status, profile = %self.profile_id(), "Match status changed");
        Ok(())
    }

    async fn remove_membership(&self, match_id: &str) -> Result<usize, StoreError> {
        retry("remove profile", || {
            self.store.remove_profile(match_id, self.profile_id())
        })
        .await
    }
}

impl fmt::Debug for MatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MatchHandle")
            .field("profile_id", &self.request.profile_id)
            .field("configuration", &self.request.configuration.name)
            .field("phase", &state.phase)
            .field("match_id", &state.record.as_ref().map(|r| &r.id))
            .finish()
    }
}

/// Run a store mutation, retrying transient failures with linear backoff.
async fn retry<T, F, Fut>(op: &'static str, mut f: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Err(e) if e.is_transient() && attempt < STORE_ATTEMPTS => {
                debug!(op, attempt, error = %e, "Retrying store operation");
                tokio::time::sleep(STORE_BACKOFF * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
