//! Signals between matched players.

mod common;

use common::{TestClient, TestServer};
use matchd_proto::{
    CloseCode, ErrorCode, Lifecycle, ProtocolMessage, SdpSignal, StringBroadcast,
};

/// Match `a` and `b` in a duel and drain their presence notices.
async fn duel(server: &TestServer) -> anyhow::Result<(TestClient, TestClient, String)> {
    let mut a = TestClient::connect(&server.url(), "a").await?;
    let mut b = TestClient::connect(&server.url(), "b").await?;
    a.find("duel").await?;
    b.find("duel").await?;
    let match_id = a.expect_matched().await?;
    assert_eq!(b.expect_matched().await?, match_id);
    for client in [&mut a, &mut b] {
        let mut host = false;
        let mut connect = false;
        while !(host && connect) {
            match client.recv().await? {
                ProtocolMessage::Host(_) => host = true,
                ProtocolMessage::Connect(_) => connect = true,
                other => anyhow::bail!("unexpected message: {other:?}"),
            }
        }
    }
    Ok((a, b, match_id))
}

fn offer(from: &str, to: &str) -> ProtocolMessage {
    ProtocolMessage::SdpOffer(SdpSignal {
        profile_id: from.to_string(),
        recipient_profile_id: to.to_string(),
        peer_sdp: "v=0".to_string(),
    })
}

#[tokio::test]
async fn direct_and_broadcast_signals_reach_the_peer() -> anyhow::Result<()> {
    let server = TestServer::spawn(&["a", "b"]).await?;
    let (mut a, mut b, _) = duel(&server).await?;

    a.send(&offer("a", "b")).await?;
    assert_eq!(b.recv().await?, offer("a", "b"));

    let hello = ProtocolMessage::StringBroadcast(StringBroadcast {
        profile_id: "b".to_string(),
        payload: "hello".to_string(),
        lifecycle: Lifecycle::Once,
    });
    b.send(&hello).await?;
    assert_eq!(a.recv().await?, hello);
    Ok(())
}

#[tokio::test]
async fn impersonation_is_forbidden() -> anyhow::Result<()> {
    let server = TestServer::spawn(&["a", "b"]).await?;
    let (mut a, mut b, _) = duel(&server).await?;

    a.send(&offer("b", "a")).await?;
    let (messages, code) = a.recv_close().await?;
    assert!(matches!(
        messages.as_slice(),
        [ProtocolMessage::Error(e)] if e.code == ErrorCode::Forbidden
    ));
    assert_eq!(code, Some(CloseCode::ViolatedPolicy));

    // HOST may fail over to b first.
    let seen = b
        .recv_until(|m| matches!(m, ProtocolMessage::Disconnect(_)))
        .await?;
    assert_eq!(seen.last(), Some(&ProtocolMessage::disconnect("a")));
    Ok(())
}

#[tokio::test]
async fn reconnect_with_join_resumes_signaling() -> anyhow::Result<()> {
    let server = TestServer::spawn(&["a", "b"]).await?;
    let (a, mut b, match_id) = duel(&server).await?;

    drop(a);
    // HOST may fail over to b first.
    let seen = b
        .recv_until(|m| matches!(m, ProtocolMessage::Disconnect(_)))
        .await?;
    assert_eq!(seen.last(), Some(&ProtocolMessage::disconnect("a")));

    let mut a = TestClient::connect(&server.url(), "a").await?;
    a.join(&match_id).await?;
    assert_eq!(a.expect_matched().await?, match_id);

    let mut host = false;
    let mut connect = false;
    while !(host && connect) {
        match a.recv().await? {
            ProtocolMessage::Host(_) => host = true,
            ProtocolMessage::Connect(c) => {
                assert_eq!(c.profile_id, "b");
                connect = true;
            }
            other => anyhow::bail!("unexpected message: {other:?}"),
        }
    }
    let seen = b
        .recv_until(|m| matches!(m, ProtocolMessage::Connect(_)))
        .await?;
    assert_eq!(seen.last(), Some(&ProtocolMessage::connect("a")));

    a.send(&offer("a", "b")).await?;
    assert_eq!(b.recv().await?, offer("a", "b"));
    Ok(())
}

#[tokio::test]
async fn second_connection_displaces_the_first() -> anyhow::Result<()> {
    let server = TestServer::spawn(&["a", "b"]).await?;
    let (mut a, _b, match_id) = duel(&server).await?;

    let mut again = TestClient::connect(&server.url(), "a").await?;
    again.join(&match_id).await?;
    assert_eq!(again.expect_matched().await?, match_id);

    let (messages, code) = a.recv_close().await?;
    assert!(matches!(
        messages.last(),
        Some(ProtocolMessage::Error(e)) if e.code == ErrorCode::DuplicateConnection
    ));
    assert_eq!(code, Some(CloseCode::ViolatedPolicy));
    Ok(())
}

#[tokio::test]
async fn sustained_direct_signals_outlast_mailbox_backlog() -> anyhow::Result<()> {
    let server = TestServer::spawn_with(&["a", "b"], "\n[limits]\nmailbox_backlog = 16\n").await?;
    let (mut a, mut b, _) = duel(&server).await?;

    for _ in 0..64 {
        a.send(&offer("a", "b")).await?;
    }
    for _ in 0..64 {
        assert_eq!(b.recv().await?, offer("a", "b"));
    }
    b.expect_silence(std::time::Duration::from_millis(200)).await?;
    Ok(())
}
