//! In-match signal dispatch.

use std::sync::Arc;

use matchd_proto::{Category, ProtocolMessage, Signal};
use tracing::{Instrument, debug, instrument};

use crate::error::{ConnectionError, ConnectionResult};
use crate::signaling::{MatchSignalingService, SignalSink, SignalingSubscription};
use crate::telemetry::spans;

/// Forwards a matched connection's signals and holds its mailbox
/// subscription.
#[derive(Debug)]
pub struct SignalingHandler {
    service: Arc<MatchSignalingService>,
    subscription: Option<SignalingSubscription>,
}

impl SignalingHandler {
    pub fn new(service: Arc<MatchSignalingService>) -> Self {
        Self {
            service,
            subscription: None,
        }
    }

    pub fn subscription(&self) -> Option<&SignalingSubscription> {
        self.subscription.as_ref()
    }

    /// Subscribe to `profile_id`'s mailbox in `match_id`.
    pub async fn start(
        &mut self,
        match_id: &str,
        profile_id: &str,
        sink: Arc<dyn SignalSink>,
    ) -> ConnectionResult {
        if self.subscription.is_some() {
            return Err(ConnectionError::ProtocolState(
                "signaling already started".into(),
            ));
        }
        let subscription = self
            .service
            .join(match_id, profile_id, sink)
            .instrument(spans::signaling(match_id, profile_id))
            .await?;
        debug!(%match_id, %profile_id, subscription = subscription.id, "Signaling started");
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Route one signal from the client.
    ///
    /// The claimed originator must be the authenticated profile. Direct
    /// signals may not be addressed to their sender, and server notices
    /// (HOST, CONNECT, DISCONNECT) are never accepted from clients.
    #[instrument(skip(self, message), fields(message_type = %message.message_type()), level = "trace")]
    pub async fn on_message(&mut self, message: ProtocolMessage) -> ConnectionResult {
        let subscription = self.subscription.as_ref().ok_or_else(|| {
            ConnectionError::ProtocolState("signal before signaling started".into())
        })?;

        if !message.category().is_signal() {
            return Err(ConnectionError::UnexpectedMessage(format!(
                "{} is not a signal",
                message.message_type()
            )));
        }
        if matches!(
            message,
            ProtocolMessage::Host(_) | ProtocolMessage::Connect(_) | ProtocolMessage::Disconnect(_)
        ) {
            return Err(ConnectionError::UnexpectedMessage(format!(
                "{} is sent by the server only",
                message.message_type()
            )));
        }

        let origin = message.profile_id().unwrap_or_default();
        if origin != subscription.profile_id {
            return Err(ConnectionError::Forbidden(format!(
                "{} cannot send as {origin}",
                subscription.profile_id
            )));
        }
        if message.category() == Category::SignalingDirect
            && message.recipient_profile_id() == Some(origin)
        {
            return Err(ConnectionError::UnexpectedMessage(
                "direct signal addressed to its sender".into(),
            ));
        }

        let signal = Signal::new(message)?;
        self.service.send(&subscription.match_id, signal).await
    }

    /// End the subscription, if any.
    pub async fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.service.leave(&subscription).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::mailbox::tests::RecordingSink;
    use crate::store::{MatchStore, MemoryMatchStore};
    use matchd_proto::{Lifecycle, SdpSignal, StringBroadcast};

    async fn setup() -> (SignalingHandler, Arc<MatchSignalingService>, String) {
        let store = Arc::new(MemoryMatchStore::new());
        let record = store.create_match("duel", 2).await.unwrap();
        store.add_profile(&record.id, "a").await.unwrap();
        store.add_profile(&record.id, "b").await.unwrap();
        let service = Arc::new(MatchSignalingService::new(store, 16));
        let mut handler = SignalingHandler::new(Arc::clone(&service));
        handler
            .start(&record.id, "a", RecordingSink::new())
            .await
            .unwrap();
        (handler, service, record.id)
    }

    fn offer(from: &str, to: &str) -> ProtocolMessage {
        ProtocolMessage::SdpOffer(SdpSignal {
            profile_id: from.into(),
            recipient_profile_id: to.into(),
            peer_sdp: "v=0".into(),
        })
    }

    #[tokio::test]
    async fn impersonation_is_forbidden() {
        let (mut handler, _service, _m) = setup().await;
        let err = handler.on_message(offer("b", "a")).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Forbidden(_)));
    }

    #[tokio::test]
    async fn self_addressed_direct_signal_is_rejected() {
        let (mut handler, _service, _m) = setup().await;
        let err = handler.on_message(offer("a", "a")).await.unwrap_err();
        assert!(matches!(err, ConnectionError::UnexpectedMessage(_)));
    }

    #[tokio::test]
    async fn server_notices_are_rejected() {
        let (mut handler, _service, _m) = setup().await;
        let err = handler
            .on_message(ProtocolMessage::host("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::UnexpectedMessage(_)));
    }

    #[tokio::test]
    async fn offer_reaches_recipient() {
        let (mut handler, service, m) = setup().await;
        handler.on_message(offer("a", "b")).await.unwrap();

        let b = RecordingSink::new();
        service.join(&m, "b", b.clone()).await.unwrap();
        assert!(b
            .signals
            .lock()
            .iter()
            .any(|s| matches!(s.message(), ProtocolMessage::SdpOffer(_))));
    }

    #[tokio::test]
    async fn stop_unsubscribes() {
        let (mut handler, service, m) = setup().await;
        handler
            .on_message(ProtocolMessage::StringBroadcast(StringBroadcast {
                profile_id: "a".into(),
                payload: "hi".into(),
                lifecycle: Lifecycle::Once,
            }))
            .await
            .unwrap();
        handler.stop().await;
        assert!(handler.subscription().is_none());
        assert!(!service.get(&m).unwrap().is_subscribed("a"));
    }
}
