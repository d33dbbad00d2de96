//! Spawns and manages `ircd` instances for integration testing.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;

use tokio::time::sleep;

/// A test server instance. A deny rule is optional: most scenarios accept
/// any client, but the rejection scenario needs one.
pub struct TestServer {
    child: Child,
    port: u16,
    data_dir: PathBuf,
}

impl TestServer {
    /// Spawn a server that admits any client.
    pub async fn spawn(port: u16) -> anyhow::Result<Self> {
        Self::spawn_with_deny(port, None).await
    }

    /// Spawn a server with an extra `[[deny]]` block, for rejection tests.
    pub async fn spawn_with_deny(port: u16, deny_block: Option<&str>) -> anyhow::Result<Self> {
        let data_dir = std::env::temp_dir().join(format!("ircd-test-{port}"));
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join("ircd.conf");
        let config_content = format!(
            r#"
[local]
name = "test.ircd"
numeric = "AA"
description = "integration test node"
metrics_port = 0

[[listen]]
bind = "127.0.0.1:{port}"

[[class]]
name = "default"
max_links = 100

[[client]]
host_mask = "*"
class = "default"

[idle_timeouts]
registration_timeout_secs = 2
{deny}
"#,
            port = port,
            deny = deny_block.unwrap_or(""),
        );

        std::fs::write(&config_path, config_content)?;

        let cargo_manifest_dir = env!("CARGO_MANIFEST_DIR");
        let binary_path = PathBuf::from(cargo_manifest_dir).join("target/debug/ircd");

        let child = Command::new(&binary_path)
            .arg("-f")
            .arg(&config_path)
            .arg("-n")
            .spawn()?;

        let server = Self { child, port, data_dir };
        server.wait_until_ready().await?;
        Ok(server)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..30 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server failed to start within 3 seconds")
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub async fn connect(&self, nick: &str) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.address(), nick).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}
