//! Test server management.
//!
//! Runs matchd in-process on an ephemeral port with one seeded session per
//! profile: profile `p` authenticates with session key `key-p`.

use std::net::SocketAddr;
use std::sync::Arc;

use matchd::{Config, Server, ServerHandle, Services};

/// A test server instance.
pub struct TestServer {
    handle: ServerHandle,
}

#[allow(dead_code)]
impl TestServer {
    /// Spawn a server with a 4-player `squad` and a 2-player `duel`
    /// configuration and a session for each of `profiles`.
    pub async fn spawn(profiles: &[&str]) -> anyhow::Result<Self> {
        Self::spawn_with(profiles, "").await
    }

    /// Like [`spawn`](Self::spawn) with extra TOML appended to the config.
    pub async fn spawn_with(profiles: &[&str], extra: &str) -> anyhow::Result<Self> {
        let mut content = String::from(
            r#"
[server]
name = "test.server"
metrics_port = 0

[listen]
address = "127.0.0.1:0"

[[matchmaking.configurations]]
name = "squad"
max_players = 4

[[matchmaking.configurations]]
name = "duel"
max_players = 2
"#,
        );
        for profile in profiles {
            content.push_str(&format!(
                "\n[[accounts.sessions]]\nkey = \"key-{profile}\"\nuser = \"user-{profile}\"\nprofiles = [\"{profile}\"]\n"
            ));
        }
        content.push_str(extra);

        let config = Config::from_toml(&content)?;
        let handle = Server::start(config).await?;
        Ok(Self { handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr())
    }

    pub fn services(&self) -> &Arc<Services> {
        self.handle.services()
    }

    pub async fn shutdown(self) {
        self.handle.shutdown().await;
    }
}
