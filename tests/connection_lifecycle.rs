//! Transport-level behavior: timeouts, malformed frames, shutdown.

mod common;

use common::{TestClient, TestServer};
use futures_util::{SinkExt, StreamExt};
use matchd_proto::{CloseCode, ErrorCode, ProtocolMessage, codec};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn silent_client_hits_handshake_deadline() -> anyhow::Result<()> {
    let server = TestServer::spawn_with(&["a"], "\n[timeouts]\nhandshake = 1\n").await?;
    let mut client = TestClient::connect(&server.url(), "a").await?;

    let (messages, code) = client.recv_close().await?;
    assert!(matches!(
        messages.as_slice(),
        [ProtocolMessage::Error(e)] if e.code == ErrorCode::Timeout
    ));
    assert_eq!(code, Some(CloseCode::GoingAway));
    Ok(())
}

#[tokio::test]
async fn unmatched_finder_also_hits_handshake_deadline() -> anyhow::Result<()> {
    let server = TestServer::spawn_with(&["a"], "\n[timeouts]\nhandshake = 1\n").await?;
    let mut client = TestClient::connect(&server.url(), "a").await?;
    client.find("duel").await?;

    let (_, code) = client.recv_close().await?;
    assert_eq!(code, Some(CloseCode::GoingAway));
    Ok(())
}

#[tokio::test]
async fn malformed_json_closes_not_consistent() -> anyhow::Result<()> {
    let server = TestServer::spawn(&["a"]).await?;
    let mut client = TestClient::connect(&server.url(), "a").await?;
    client.send_raw("{not json").await?;

    let (messages, code) = client.recv_close().await?;
    assert!(matches!(
        messages.as_slice(),
        [ProtocolMessage::Error(e)] if e.code == ErrorCode::Invalid
    ));
    assert_eq!(code, Some(CloseCode::NotConsistent));
    Ok(())
}

#[tokio::test]
async fn binary_frame_is_unexpected() -> anyhow::Result<()> {
    let server = TestServer::spawn(&["a"]).await?;
    let (mut ws, _) = connect_async(server.url()).await?;
    ws.send(Message::Binary(vec![0, 1, 2])).await?;

    let mut error = None;
    let mut close = None;
    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Text(text) => error = Some(codec::decode(&text)?),
            Message::Close(frame) => {
                close = frame.map(|f| u16::from(f.code));
                break;
            }
            _ => {}
        }
    }
    assert!(matches!(
        error,
        Some(ProtocolMessage::Error(e)) if e.code == ErrorCode::UnexpectedMessage
    ));
    assert_eq!(close, Some(CloseCode::ViolatedPolicy.code()));
    Ok(())
}

#[tokio::test]
async fn signal_before_handshake_is_a_state_error() -> anyhow::Result<()> {
    let server = TestServer::spawn(&["a"]).await?;
    let mut client = TestClient::connect(&server.url(), "a").await?;
    client.leave().await?;

    let (messages, code) = client.recv_close().await?;
    assert!(matches!(
        messages.as_slice(),
        [ProtocolMessage::Error(e)] if e.code == ErrorCode::ProtocolState
    ));
    assert_eq!(code, Some(CloseCode::ViolatedPolicy));
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_open_connections_normally() -> anyhow::Result<()> {
    let server = TestServer::spawn(&["a"]).await?;
    let mut client = TestClient::connect(&server.url(), "a").await?;
    client.find("duel").await?;
    // Let the FIND reach the server before shutting down.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    server.shutdown().await;
    let (messages, code) = client.recv_close().await?;
    assert!(messages.is_empty());
    assert_eq!(code, Some(CloseCode::NormalClosure));
    Ok(())
}

#[tokio::test]
async fn shutdown_waits_for_connections_to_leave_signaling() -> anyhow::Result<()> {
    let server = TestServer::spawn(&["a", "b"]).await?;
    let services = std::sync::Arc::clone(server.services());
    let mut a = TestClient::connect(&server.url(), "a").await?;
    let mut b = TestClient::connect(&server.url(), "b").await?;
    a.find("duel").await?;
    b.find("duel").await?;
    let match_id = a.expect_matched().await?;
    b.expect_matched().await?;
    b.recv_until(|m| matches!(m, ProtocolMessage::Connect(_))).await?;
    assert_eq!(services.signaling.get(&match_id).map(|s| s.subscribers().len()), Some(2));

    server.shutdown().await;
    let subscribers = services
        .signaling
        .get(&match_id)
        .map(|s| s.subscribers().len())
        .unwrap_or_default();
    assert_eq!(subscribers, 0);
    Ok(())
}
