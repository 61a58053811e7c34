//! Match lifecycle control: OPEN, CLOSE, END and LEAVE.

use matchd_proto::ProtocolMessage;
use tracing::info;

use crate::error::{ConnectionError, ConnectionResult};
use crate::matchmaking::MultiMatchRecord;

/// What the transport should do after a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    PersistConnection,
    CloseConnection,
}

/// Apply a control message from `profile_id` to its match.
pub async fn dispatch(
    profile_id: &str,
    record: &MultiMatchRecord,
    message: &ProtocolMessage,
) -> ConnectionResult<ControlAction> {
    let origin = message.profile_id().unwrap_or_default();
    if origin != profile_id {
        return Err(ConnectionError::Forbidden(format!(
            "{profile_id} cannot send as {origin}"
        )));
    }

    let handle = &record.handle;
    let action = match message {
        ProtocolMessage::Open(_) => {
            handle.open_match().await?;
            ControlAction::PersistConnection
        }
        ProtocolMessage::Close(_) => {
            handle.close_match().await?;
            ControlAction::PersistConnection
        }
        ProtocolMessage::End(_) => {
            handle.end_match().await?;
            ControlAction::PersistConnection
        }
        ProtocolMessage::Leave(_) => {
            handle.leave().await?;
            ControlAction::CloseConnection
        }
        other => {
            return Err(ConnectionError::UnexpectedMessage(format!(
                "{} is not a control message",
                other.message_type()
            )));
        }
    };

    info!(
        match_id = %record.match_id(),
        profile = %profile_id,
        message_type = %message.message_type(),
        ?action,
        "Control message applied"
    );
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplicationConfiguration;
    use crate::matchmaking::tests::ChannelListener;
    use crate::matchmaking::{MatchHandle, MatchRequest};
    use crate::store::{MatchStatus, MatchStore, MemoryMatchStore};
    use matchd_proto::ControlRequest;
    use std::sync::Arc;

    async fn matched(store: &Arc<MemoryMatchStore>) -> MultiMatchRecord {
        let record = store.create_match("duel", 2).await.unwrap();
        let (listener, mut rx) = ChannelListener::pair();
        let handle = MatchHandle::new(
            MatchRequest {
                profile_id: "a".into(),
                configuration: Arc::new(ApplicationConfiguration {
                    name: "duel".into(),
                    algorithm: None,
                    max_players: 2,
                }),
            },
            store.clone(),
            listener,
            None,
        );
        handle.start().unwrap();
        handle.set_result(record).await.unwrap();
        rx.recv().await.unwrap().unwrap()
    }

    fn control(build: fn(ControlRequest) -> ProtocolMessage, profile: &str) -> ProtocolMessage {
        build(ControlRequest {
            profile_id: profile.into(),
        })
    }

    #[tokio::test]
    async fn close_persists_connection() {
        let store = Arc::new(MemoryMatchStore::new());
        let record = matched(&store).await;
        let action = dispatch("a", &record, &control(ProtocolMessage::Close, "a"))
            .await
            .unwrap();
        assert_eq!(action, ControlAction::PersistConnection);
        assert_eq!(
            store.get_match(record.match_id()).await.unwrap().status,
            MatchStatus::Closed
        );
    }

    #[tokio::test]
    async fn leave_closes_connection_and_ends_match() {
        let store = Arc::new(MemoryMatchStore::new());
        let record = matched(&store).await;
        let action = dispatch("a", &record, &control(ProtocolMessage::Leave, "a"))
            .await
            .unwrap();
        assert_eq!(action, ControlAction::CloseConnection);
        assert!(store.get_profiles(record.match_id()).await.unwrap().is_empty());
        assert_eq!(
            store.get_match(record.match_id()).await.unwrap().status,
            MatchStatus::Ended
        );
    }

    #[tokio::test]
    async fn control_for_another_profile_is_forbidden() {
        let store = Arc::new(MemoryMatchStore::new());
        let record = matched(&store).await;
        let err = dispatch("a", &record, &control(ProtocolMessage::End, "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Forbidden(_)));
    }
}
