//! Windows gate driven by `rasdial`

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::VpnConfig;

use super::VpnGate;
use super::command::{CommandRunner, resolve_tool};

/// Text `rasdial` prints once a dial-up entry is connected
pub const SUCCESS_MARKER: &str = "Command completed successfully";

/// Dials a Windows phone-book entry
pub struct RasdialGate {
    runner: Arc<dyn CommandRunner>,
    binary: PathBuf,
    connection: String,
    username: String,
    password: String,
    settle_delay: Duration,
    connect_timeout: Duration,
    disconnect_timeout: Duration,
}

impl RasdialGate {
    /// Create a gate, resolving `rasdial` from the override or the PATH
    pub fn new(config: &VpnConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_binary(
            config,
            resolve_tool(config.rasdial_path.as_deref(), "rasdial", config.search_path),
            runner,
        )
    }

    /// Create a gate with an explicit `rasdial` location
    pub fn with_binary(config: &VpnConfig, binary: PathBuf, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary,
            connection: config.connection_name.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            settle_delay: config.settle_delay,
            connect_timeout: config.connect_timeout,
            disconnect_timeout: config.disconnect_timeout,
        }
    }

    async fn disconnect(&self) -> bool {
        match self
            .runner
            .run(
                &self.binary,
                &[self.connection.as_str(), "/disconnect"],
                self.disconnect_timeout,
            )
            .await
        {
            Ok(output) => output.success,
            Err(e) => {
                tracing::debug!(connection = %self.connection, error = %e, "rasdial disconnect did not run");
                false
            }
        }
    }
}

#[async_trait]
impl VpnGate for RasdialGate {
    async fn acquire(&self) -> bool {
        tracing::info!(connection = %self.connection, "establishing VPN connection");

        self.disconnect().await;

        let output = match self
            .runner
            .run(
                &self.binary,
                &[
                    self.connection.as_str(),
                    self.username.as_str(),
                    self.password.as_str(),
                ],
                self.connect_timeout,
            )
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(connection = %self.connection, error = %e, "rasdial could not be run");
                return false;
            }
        };

        // rasdial exit codes are unreliable; the printed confirmation is authoritative
        if !output.stdout.contains(SUCCESS_MARKER) {
            tracing::error!(
                connection = %self.connection,
                stdout = %output.stdout.trim(),
                stderr = %output.stderr.trim(),
                "rasdial did not confirm the connection"
            );
            return false;
        }

        tokio::time::sleep(self.settle_delay).await;
        tracing::info!(connection = %self.connection, "VPN connection up");
        true
    }

    async fn release(&self) {
        if self.disconnect().await {
            tracing::info!(connection = %self.connection, "VPN connection released");
        } else {
            tracing::warn!(connection = %self.connection, "VPN disconnect failed");
        }
    }

    fn name(&self) -> &'static str {
        "rasdial"
    }
}
