//! Protocol message handler: the single entry and exit point between a
//! connection's transport and its handlers.
//!
//! Every failure ends up in [`ProtocolMessageHandler::terminate`], which tells
//! the client (if it still can), logs, and tears down the handshake, the
//! signaling subscription and the transport in that order.

use std::sync::Arc;

use matchd_proto::{Category, ProtocolMessage, Signal, codec};
use tracing::{debug, error, info, warn};

use super::control::{self, ControlAction};
use super::handshake::HandshakeHandler;
use super::signaling::SignalingHandler;
use super::state::{ConnectionPhase, ConnectionState, Drained};
use super::{ClientSession, ConnectionEvent, ConnectionSink};
use crate::error::{ConnectionError, ConnectionResult};
use crate::metrics;
use crate::server::Services;
use crate::telemetry::HandshakeTimer;

/// Per-connection protocol orchestrator.
#[derive(Debug)]
pub struct ProtocolMessageHandler<S> {
    session: S,
    sink: ConnectionSink,
    state: ConnectionState,
    handshake: HandshakeHandler,
    signaling: SignalingHandler,
    timer: Option<HandshakeTimer>,
    termination: Option<ConnectionError>,
}

impl<S: ClientSession> ProtocolMessageHandler<S> {
    pub fn new(services: Arc<Services>, session: S, sink: ConnectionSink) -> Self {
        Self {
            state: ConnectionState::new(&services.config.limits),
            handshake: HandshakeHandler::new(Arc::clone(&services), sink.clone()),
            signaling: SignalingHandler::new(Arc::clone(&services.signaling)),
            session,
            sink,
            timer: None,
            termination: None,
        }
    }

    #[inline]
    pub fn phase(&self) -> ConnectionPhase {
        self.state.phase()
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    /// Why the connection ended, once it has.
    pub fn termination(&self) -> Option<&ConnectionError> {
        self.termination.as_ref()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Transport is up.
    pub async fn on_open(&mut self) {
        let result = self.state.start().and_then(|()| self.handshake.start());
        if let Err(e) = result {
            self.terminate(e).await;
        }
    }

    /// A text frame arrived.
    pub async fn on_text(&mut self, text: &str) {
        match codec::decode(text) {
            Ok(message) => self.on_message(message).await,
            Err(e) => self.terminate(e.into()).await,
        }
    }

    /// A decoded message arrived.
    pub async fn on_message(&mut self, message: ProtocolMessage) {
        if let Err(e) = self.dispatch(message).await {
            self.terminate(e).await;
        }
    }

    /// Work started by a handler completed.
    pub async fn on_event(&mut self, event: ConnectionEvent) {
        if let Err(e) = self.handle_event(event).await {
            self.terminate(e).await;
        }
    }

    /// A mailbox delivered a signal for the client.
    pub async fn on_signal(&mut self, signal: Signal) {
        if let Err(e) = self.send_outbound(signal.message().clone()) {
            self.terminate(e).await;
        }
    }

    async fn dispatch(&mut self, message: ProtocolMessage) -> ConnectionResult {
        if self.is_terminated() {
            return Ok(());
        }
        if let Some(negotiated) = self.handshake.version() {
            let minimum = message.message_type().min_version();
            if minimum > negotiated {
                return Err(ConnectionError::UnexpectedMessage(format!(
                    "{} requires version {minimum}, negotiated {negotiated}",
                    message.message_type()
                )));
            }
        }

        match message.category() {
            Category::Handshake => {
                if self.phase() != ConnectionPhase::Ready {
                    return Err(ConnectionError::ProtocolState(format!(
                        "{} while {}",
                        message.message_type(),
                        self.phase()
                    )));
                }
                self.state.handshake()?;
                self.timer = Some(HandshakeTimer::start());
                self.handshake.on_message(&message)
            }
            Category::Signaling | Category::SignalingDirect => {
                match self.state.buffer_inbound(message)? {
                    Some(message) => self.signaling.on_message(message).await,
                    None => Ok(()),
                }
            }
            Category::Control => {
                let (Some(auth), Some(record), ConnectionPhase::Signaling) =
                    (self.state.auth(), self.state.match_record(), self.phase())
                else {
                    return Err(ConnectionError::ProtocolState(format!(
                        "{} while {}",
                        message.message_type(),
                        self.phase()
                    )));
                };
                match control::dispatch(auth.profile_id(), record, &message).await? {
                    ControlAction::PersistConnection => Ok(()),
                    ControlAction::CloseConnection => Err(ConnectionError::Left),
                }
            }
            Category::Error => Err(ConnectionError::UnexpectedMessage(
                "ERROR is sent by the server only".into(),
            )),
        }
    }

    async fn handle_event(&mut self, event: ConnectionEvent) -> ConnectionResult {
        if self.is_terminated() {
            return Ok(());
        }
        match event {
            ConnectionEvent::Authenticated(result) => {
                if let Some(auth) = self.handshake.on_authenticated(result)? {
                    if let Some(drained) = self.state.authenticated(auth)? {
                        self.enter_signaling(drained).await?;
                    }
                }
                Ok(())
            }
            ConnectionEvent::JoinVerified(result) => self.handshake.on_join_verified(result),
            ConnectionEvent::Matched(result) => {
                let Some(record) = self.handshake.on_matched(result)? else {
                    return Ok(());
                };
                let profile_id = self
                    .state
                    .auth()
                    .map(|auth| auth.profile_id().to_string())
                    .ok_or_else(|| ConnectionError::Internal("matched before authentication".into()))?;
                self.session.send(&ProtocolMessage::matched(
                    profile_id,
                    record.match_id(),
                    record.configuration.name.as_str(),
                ))?;
                if let Some(drained) = self.state.matched(record)? {
                    self.enter_signaling(drained).await?;
                }
                Ok(())
            }
            ConnectionEvent::Fatal(error) => Err(error),
        }
    }

    /// Subscribe to the match, flush held output, then replay held input in
    /// arrival order.
    async fn enter_signaling(&mut self, drained: Drained) -> ConnectionResult {
        let (match_id, profile_id) = match (self.state.match_record(), self.state.auth()) {
            (Some(record), Some(auth)) => {
                (record.match_id().to_string(), auth.profile_id().to_string())
            }
            _ => {
                return Err(ConnectionError::Internal(
                    "signaling without auth and match".into(),
                ));
            }
        };

        if let Some(timer) = self.timer.take() {
            timer.finish("matched");
        }
        info!(%match_id, profile = %profile_id, "Signaling");

        self.signaling
            .start(&match_id, &profile_id, Arc::new(self.sink.clone()))
            .await?;
        for message in drained.outbound {
            self.session.send(&message)?;
        }
        for message in drained.inbound {
            self.signaling.on_message(message).await?;
        }
        Ok(())
    }

    fn send_outbound(&mut self, message: ProtocolMessage) -> ConnectionResult {
        match self.state.buffer_outbound(message)? {
            Some(message) => self.session.send(&message),
            None => Ok(()),
        }
    }

    /// End the connection with `error`. Idempotent.
    pub async fn terminate(&mut self, error: ConnectionError) {
        if !self.state.terminate() {
            return;
        }

        if let Some(payload) = error.to_protocol_error() {
            metrics::record_connection_error(error.error_code());
            if self.session.is_open() {
                if let Err(e) = self.session.send(&ProtocolMessage::Error(payload)) {
                    debug!(error = %e, "Could not send ERROR before closing");
                }
            }
        }

        if error.is_server_fault() {
            error!(error = %error, "Connection terminated");
        } else if !error.is_expected() {
            warn!(error = %error, "Connection terminated");
        } else {
            debug!(error = %error, "Connection terminated");
        }

        if let Some(timer) = self.timer.take() {
            timer.finish("failed");
        }
        self.handshake.stop();
        self.signaling.stop().await;
        self.session.close(error.close_code(), &error.to_string());
        self.termination = Some(error);
    }
}
