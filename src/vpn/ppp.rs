//! Linux gate driven by `pon`/`poff` and verified with `ip`

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::VpnConfig;

use super::VpnGate;
use super::command::{CommandRunner, resolve_tool};

/// Resolved locations of the ppp tools
#[derive(Debug, Clone)]
pub struct PppTools {
    /// `pon`
    pub pon: PathBuf,
    /// `poff`
    pub poff: PathBuf,
    /// `ip`
    pub ip: PathBuf,
}

impl PppTools {
    /// Resolve each tool from the configured override or the PATH
    pub fn resolve(config: &VpnConfig) -> Self {
        Self {
            pon: resolve_tool(config.pon_path.as_deref(), "pon", config.search_path),
            poff: resolve_tool(config.poff_path.as_deref(), "poff", config.search_path),
            ip: resolve_tool(config.ip_path.as_deref(), "ip", config.search_path),
        }
    }
}

/// Dials a ppp peer and checks that the tunnel interface carries an address
pub struct PppGate {
    runner: Arc<dyn CommandRunner>,
    tools: PppTools,
    peer: String,
    interface: String,
    require_default_route: bool,
    settle_delay: Duration,
    connect_timeout: Duration,
    disconnect_timeout: Duration,
    probe_timeout: Duration,
    syslog_path: PathBuf,
    syslog_lines: usize,
}

impl PppGate {
    /// Create a gate from configuration and explicit tool locations
    pub fn new(config: &VpnConfig, tools: PppTools, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            tools,
            peer: config.peer_name.clone(),
            interface: config.interface.clone(),
            require_default_route: config.require_default_route,
            settle_delay: config.settle_delay,
            connect_timeout: config.connect_timeout,
            disconnect_timeout: config.disconnect_timeout,
            probe_timeout: config.probe_timeout,
            syslog_path: config.syslog_path.clone(),
            syslog_lines: config.syslog_lines,
        }
    }

    async fn hang_up(&self) -> bool {
        match self
            .runner
            .run(&self.tools.poff, &[self.peer.as_str()], self.disconnect_timeout)
            .await
        {
            Ok(output) if output.success => true,
            Ok(output) => {
                tracing::debug!(peer = %self.peer, stderr = %output.stderr.trim(), "poff reported failure");
                false
            }
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = %e, "poff did not run");
                false
            }
        }
    }

    /// Whether `ip addr show <iface>` lists the interface with an IPv4 address
    async fn interface_is_up(&self) -> bool {
        match self
            .runner
            .run(
                &self.tools.ip,
                &["addr", "show", self.interface.as_str()],
                self.probe_timeout,
            )
            .await
        {
            Ok(output) if output.success => {
                output.stdout.contains(&self.interface) && output.stdout.contains("inet")
            }
            Ok(output) => {
                tracing::warn!(interface = %self.interface, stderr = %output.stderr.trim(), "interface probe failed");
                false
            }
            Err(e) => {
                tracing::warn!(interface = %self.interface, error = %e, "interface probe did not run");
                false
            }
        }
    }

    /// Whether the default route points through the tunnel
    async fn default_route_uses_tunnel(&self) -> bool {
        match self
            .runner
            .run(&self.tools.ip, &["route", "show", "default"], self.probe_timeout)
            .await
        {
            Ok(output) => output.stdout.contains(&self.interface),
            Err(e) => {
                tracing::warn!(error = %e, "route probe did not run");
                false
            }
        }
    }

    async fn log_diagnostics(&self) {
        match tokio::fs::read_to_string(&self.syslog_path).await {
            Ok(contents) => {
                let tail = tail_lines(&contents, self.syslog_lines);
                tracing::error!(
                    path = %self.syslog_path.display(),
                    "recent system log:\n{}",
                    tail
                );
            }
            Err(e) => tracing::debug!(
                path = %self.syslog_path.display(),
                error = %e,
                "system log unavailable for diagnostics"
            ),
        }
    }
}

#[async_trait]
impl VpnGate for PppGate {
    async fn acquire(&self) -> bool {
        tracing::info!(peer = %self.peer, "establishing VPN tunnel");

        // Stale sessions are torn down first; failures here are expected
        self.hang_up().await;

        match self
            .runner
            .run(&self.tools.pon, &[self.peer.as_str()], self.connect_timeout)
            .await
        {
            Ok(output) if output.success => {}
            Ok(output) => {
                tracing::error!(
                    peer = %self.peer,
                    stdout = %output.stdout.trim(),
                    stderr = %output.stderr.trim(),
                    "pon failed"
                );
                self.log_diagnostics().await;
                return false;
            }
            Err(e) => {
                tracing::error!(peer = %self.peer, error = %e, "pon could not be run");
                self.log_diagnostics().await;
                return false;
            }
        }

        tokio::time::sleep(self.settle_delay).await;

        if !self.interface_is_up().await {
            tracing::error!(interface = %self.interface, "tunnel interface has no address");
            self.log_diagnostics().await;
            return false;
        }

        if !self.default_route_uses_tunnel().await {
            if self.require_default_route {
                tracing::error!(interface = %self.interface, "default route does not use the tunnel");
                return false;
            }
            tracing::warn!(interface = %self.interface, "default route does not use the tunnel");
        }

        tracing::info!(peer = %self.peer, interface = %self.interface, "VPN tunnel up");
        true
    }

    async fn release(&self) {
        if self.hang_up().await {
            tracing::info!(peer = %self.peer, "VPN tunnel released");
        } else {
            tracing::warn!(peer = %self.peer, "VPN tunnel release failed");
        }
    }

    fn name(&self) -> &'static str {
        "ppp"
    }
}

fn tail_lines(contents: &str, count: usize) -> String {
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
