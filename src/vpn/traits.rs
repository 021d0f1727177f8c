//! The VPN gate capability

use async_trait::async_trait;

/// Binary precondition in front of every export workflow
///
/// `acquire` tears down any stale tunnel, dials a new one and verifies it.
/// It never errors: subprocess failures, timeouts, missing tools and
/// unsupported platforms all come back as `false`. There is no retry at this
/// layer.
///
/// # Examples
///
/// ```no_run
/// use scopus_harvester::config::VpnConfig;
/// use scopus_harvester::vpn::gate_from_config;
///
/// # #[tokio::main]
/// # async fn main() {
/// let gate = gate_from_config(&VpnConfig::default());
/// if gate.acquire().await {
///     // ... run the workflow ...
///     gate.release().await;
/// }
/// # }
/// ```
#[async_trait]
pub trait VpnGate: Send + Sync {
    /// Establish and verify the tunnel
    async fn acquire(&self) -> bool;

    /// Best-effort teardown; failures are logged, not returned
    async fn release(&self);

    /// Name of this gate implementation
    fn name(&self) -> &'static str;

    /// Whether this gate actually dials a connection
    fn dials(&self) -> bool {
        true
    }

    /// Message recorded on an identifier when `acquire` returned false
    fn failure_message(&self) -> String {
        format!("VPN connection via {} failed.", self.name())
    }
}
