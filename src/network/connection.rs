//! Connection - drives one client WebSocket.
//!
//! Each connection runs in its own task. The read half and the handler's
//! completion channels are multiplexed in one `tokio::select!` loop; writes
//! go through a bounded queue to a separate writer task so a slow client can
//! never block the loop.
//!
//! ```text
//!  ws read ─┐
//!  events ──┼─▶ select! ─▶ ProtocolMessageHandler ─▶ WsSession ─▶ writer ─▶ ws write
//!  signals ─┤
//!  timers ──┘
//! ```

use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use matchd_proto::{CloseCode, ProtocolMessage, Signal, codec};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{Instrument, debug};

use crate::error::{ConnectionError, ConnectionResult};
use crate::handlers::{
    ClientSession, ConnectionEvent, ConnectionPhase, ConnectionSink, ProtocolMessageHandler,
};
use crate::metrics;
use crate::server::Services;
use crate::telemetry::spans;

type WsStream = WebSocketStream<TcpStream>;

/// Close frame reasons are capped at 123 bytes by RFC 6455.
const MAX_CLOSE_REASON: usize = 123;

/// Work queued for the writer task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Ping,
    Close(CloseCode, String),
}

/// Write side handed to the protocol handler.
#[derive(Debug)]
pub struct WsSession {
    queue: mpsc::Sender<Outbound>,
    open: bool,
}

impl WsSession {
    fn new(queue: mpsc::Sender<Outbound>) -> Self {
        Self { queue, open: true }
    }

    /// Queue a keepalive ping. Skipped when the queue is full.
    fn ping(&self) {
        if self.is_open() {
            let _ = self.queue.try_send(Outbound::Ping);
        }
    }
}

impl ClientSession for WsSession {
    fn send(&mut self, message: &ProtocolMessage) -> ConnectionResult {
        if !self.is_open() {
            return Err(ConnectionError::Closed);
        }
        let text = codec::encode(message)?;
        self.queue.try_send(Outbound::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConnectionError::BufferOverrun("outbound queue"),
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }

    fn close(&mut self, code: CloseCode, reason: &str) {
        if !self.open {
            return;
        }
        self.open = false;
        let reason = truncate(reason, MAX_CLOSE_REASON).to_owned();
        if self.queue.try_send(Outbound::Close(code, reason)).is_err() {
            debug!("Writer gone or saturated, closing without a close frame");
        }
    }

    fn is_open(&self) -> bool {
        self.open && !self.queue.is_closed()
    }
}

/// Outcome of one pass through the select loop.
enum SelectResult {
    Text(String),
    Event(ConnectionEvent),
    Signal(Signal),
    Activity,
    Ping,
    Terminate(ConnectionError),
    None,
}

/// A client connection handler.
pub struct Connection {
    id: u64,
    addr: SocketAddr,
    services: Arc<Services>,
    stream: WsStream,
    shutdown: broadcast::Receiver<()>,
}

impl Connection {
    pub fn new(
        id: u64,
        addr: SocketAddr,
        services: Arc<Services>,
        stream: WsStream,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            id,
            addr,
            services,
            stream,
            shutdown,
        }
    }

    /// Run the connection until it terminates.
    pub async fn run(self) {
        let span = spans::connection(self.id, self.addr);
        self.run_inner().instrument(span).await;
    }

    async fn run_inner(self) {
        let Self {
            services,
            stream,
            mut shutdown,
            ..
        } = self;
        metrics::record_connection_opened();
        debug!("Connection opened");

        let limits = &services.config.limits;
        let timeouts = services.config.timeouts.clone();

        let (write, mut read) = stream.split();
        let (out_tx, out_rx) = mpsc::channel(limits.outbound_queue.max(1));
        let writer = tokio::spawn(write_loop(write, out_rx).in_current_span());

        let (signals_tx, mut signals_rx) = mpsc::channel(limits.signal_queue.max(1));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let sink = ConnectionSink::new(signals_tx, events_tx);

        let mut handler =
            ProtocolMessageHandler::new(Arc::clone(&services), WsSession::new(out_tx), sink);
        handler.on_open().await;

        let mut ping = interval(timeouts.ping_interval());
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.reset();
        let mut handshake_deadline = pin!(sleep(timeouts.handshake()));
        let idle = timeouts.idle();
        let mut last_activity = Instant::now();

        while !handler.is_terminated() {
            let in_handshake = handler.phase() < ConnectionPhase::Signaling;
            let result = tokio::select! {
                frame = read.next() => classify_frame(frame),
                Some(event) = events_rx.recv() => SelectResult::Event(event),
                Some(signal) = signals_rx.recv() => SelectResult::Signal(signal),
                _ = ping.tick() => SelectResult::Ping,
                _ = &mut handshake_deadline, if in_handshake => {
                    SelectResult::Terminate(ConnectionError::Timeout("handshake"))
                }
                _ = shutdown.recv() => SelectResult::Terminate(ConnectionError::Shutdown),
            };

            match result {
                SelectResult::Text(text) => {
                    last_activity = Instant::now();
                    handler.on_text(&text).await;
                }
                SelectResult::Event(event) => handler.on_event(event).await,
                SelectResult::Signal(signal) => handler.on_signal(signal).await,
                SelectResult::Activity => last_activity = Instant::now(),
                SelectResult::Ping => {
                    if last_activity.elapsed() >= idle {
                        handler.terminate(ConnectionError::Timeout("idle")).await;
                    } else {
                        handler.session().ping();
                    }
                }
                SelectResult::Terminate(error) => handler.terminate(error).await,
                SelectResult::None => {}
            }
        }

        let reason = handler
            .termination()
            .map_or("closed", ConnectionError::error_code);
        metrics::record_connection_closed(reason);
        debug!(reason, "Connection closed");

        // Dropping the handler drops the last queue sender, letting the
        // writer flush the close frame and exit.
        drop(handler);
        if let Err(e) = writer.await {
            debug!(error = %e, "Writer task failed");
        }
    }
}

fn classify_frame(
    frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
) -> SelectResult {
    match frame {
        Some(Ok(Message::Text(text))) => SelectResult::Text(text),
        Some(Ok(Message::Binary(_))) => SelectResult::Terminate(ConnectionError::UnexpectedMessage(
            "binary frames are not supported".into(),
        )),
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => SelectResult::Activity,
        Some(Ok(Message::Frame(_))) => SelectResult::None,
        Some(Ok(Message::Close(frame))) => {
            debug!(?frame, "Client closed the connection");
            SelectResult::Terminate(ConnectionError::Closed)
        }
        Some(Err(e)) => {
            debug!(error = %e, "WebSocket read error");
            SelectResult::Terminate(ConnectionError::Closed)
        }
        None => SelectResult::Terminate(ConnectionError::Closed),
    }
}

async fn write_loop(mut write: SplitSink<WsStream, Message>, mut queue: mpsc::Receiver<Outbound>) {
    while let Some(outbound) = queue.recv().await {
        let result = match outbound {
            Outbound::Text(text) => write.send(Message::Text(text)).await,
            Outbound::Ping => write.send(Message::Ping(Vec::new())).await,
            Outbound::Close(code, reason) => {
                let frame = CloseFrame {
                    code: code.code().into(),
                    reason: reason.into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    debug!(error = %e, "Failed to send close frame");
                }
                break;
            }
        };
        if let Err(e) = result {
            debug!(error = %e, "WebSocket write failed");
            break;
        }
    }
    // Bounded so a peer that never reads cannot pin the task.
    let _ = tokio::time::timeout(Duration::from_secs(5), write.close()).await;
}

/// Longest prefix of `s` within `max` bytes, on a char boundary.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 123), "short");
        let long = "é".repeat(100);
        let cut = truncate(&long, MAX_CLOSE_REASON);
        assert!(cut.len() <= MAX_CLOSE_REASON);
        assert_eq!(cut.len() % 2, 0);
    }

    #[tokio::test]
    async fn session_reports_full_queue_as_overrun() {
        let (tx, _rx) = mpsc::channel(1);
        let mut session = WsSession::new(tx);
        let message = ProtocolMessage::host("a");
        session.send(&message).unwrap();
        assert_eq!(
            session.send(&message),
            Err(ConnectionError::BufferOverrun("outbound queue"))
        );
    }

    #[tokio::test]
    async fn close_is_sent_once_and_ends_the_session() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut session = WsSession::new(tx);
        session.close(CloseCode::GoingAway, "bye");
        session.close(CloseCode::NormalClosure, "again");
        assert!(!session.is_open());
        assert!(matches!(
            rx.recv().await,
            Some(Outbound::Close(CloseCode::GoingAway, ref r)) if r == "bye"
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn frames_map_to_loop_outcomes() {
        assert!(matches!(
            classify_frame(Some(Ok(Message::Binary(vec![1])))),
            SelectResult::Terminate(ConnectionError::UnexpectedMessage(_))
        ));
        assert!(matches!(
            classify_frame(None),
            SelectResult::Terminate(ConnectionError::Closed)
        ));
        assert!(matches!(
            classify_frame(Some(Ok(Message::Pong(Vec::new())))),
            SelectResult::Activity
        ));
    }
}
