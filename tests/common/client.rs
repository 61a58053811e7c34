//! Test protocol client.
//!
//! Speaks JSON over a WebSocket and asserts on received messages.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use matchd_proto::{
    CloseCode, ControlRequest, FindRequest, JoinRequest, ProtocolMessage, Version, codec,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test client bound to one profile.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    profile: String,
}

#[allow(dead_code)]
impl TestClient {
    /// Connect to a test server as `profile`.
    pub async fn connect(url: &str, profile: &str) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(url).await?;
        Ok(Self {
            ws,
            profile: profile.to_string(),
        })
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Send a raw text frame.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a protocol message.
    pub async fn send(&mut self, message: &ProtocolMessage) -> anyhow::Result<()> {
        let text = codec::encode(message)?;
        self.send_raw(&text).await
    }

    /// Send FIND for `configuration` with this profile's seeded session.
    pub async fn find(&mut self, configuration: &str) -> anyhow::Result<()> {
        let message = ProtocolMessage::Find(FindRequest {
            version: Version::CURRENT,
            profile_id: self.profile.clone(),
            session_key: format!("key-{}", self.profile),
            configuration: configuration.to_string(),
        });
        self.send(&message).await
    }

    /// Send JOIN for `match_id` with this profile's seeded session.
    pub async fn join(&mut self, match_id: &str) -> anyhow::Result<()> {
        let message = ProtocolMessage::Join(JoinRequest {
            version: Version::CURRENT,
            profile_id: self.profile.clone(),
            session_key: format!("key-{}", self.profile),
            match_id: match_id.to_string(),
        });
        self.send(&message).await
    }

    /// Send LEAVE.
    pub async fn leave(&mut self) -> anyhow::Result<()> {
        let message = ProtocolMessage::Leave(ControlRequest {
            profile_id: self.profile.clone(),
        });
        self.send(&message).await
    }

    /// Receive a single message from the server.
    pub async fn recv(&mut self) -> anyhow::Result<ProtocolMessage> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a message with a timeout. Control frames are skipped.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<ProtocolMessage> {
        loop {
            let frame = timeout(dur, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection ended"))??;
            match frame {
                Message::Text(text) => return Ok(codec::decode(&text)?),
                Message::Close(frame) => anyhow::bail!("connection closed: {frame:?}"),
                _ => continue,
            }
        }
    }

    /// Receive messages until the given predicate returns true.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<ProtocolMessage>>
    where
        F: FnMut(&ProtocolMessage) -> bool,
    {
        let mut messages = Vec::new();
        loop {
            let msg = self.recv().await?;
            let done = predicate(&msg);
            messages.push(msg);
            if done {
                break;
            }
        }
        Ok(messages)
    }

    /// Receive until MATCHED and return the match id.
    pub async fn expect_matched(&mut self) -> anyhow::Result<String> {
        let messages =
            self.recv_until(|m| matches!(m, ProtocolMessage::Matched(_)))
                .await?;
        match messages.last() {
            Some(ProtocolMessage::Matched(m)) => Ok(m.match_id.clone()),
            other => anyhow::bail!("expected MATCHED, got {other:?}"),
        }
    }

    /// Assert no text message arrives within `dur`.
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match self.recv_timeout(dur).await {
            Ok(message) => anyhow::bail!("unexpected message: {message:?}"),
            Err(e) if e.is::<tokio::time::error::Elapsed>() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Read until the server closes, returning every text message seen and
    /// the close code.
    pub async fn recv_close(&mut self) -> anyhow::Result<(Vec<ProtocolMessage>, Option<CloseCode>)> {
        let mut messages = Vec::new();
        loop {
            let frame = timeout(Duration::from_secs(5), self.ws.next()).await?;
            match frame {
                Some(Ok(Message::Text(text))) => messages.push(codec::decode(&text)?),
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.and_then(|f| CloseCode::from_code(u16::from(f.code)));
                    return Ok((messages, code));
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return Ok((messages, None)),
            }
        }
    }
}
