//! Gates that never dial

use async_trait::async_trait;

use super::VpnGate;

/// Always open; the tunnel is managed outside the service
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGate;

#[async_trait]
impl VpnGate for DisabledGate {
    async fn acquire(&self) -> bool {
        tracing::debug!("VPN gate disabled, proceeding without dialing");
        true
    }

    async fn release(&self) {}

    fn name(&self) -> &'static str {
        "disabled"
    }

    fn dials(&self) -> bool {
        false
    }
}

/// Always closed; the host platform has no supported dial tool
#[derive(Debug, Clone)]
pub struct UnsupportedGate {
    platform: String,
}

impl UnsupportedGate {
    /// Gate for the given platform name
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }

    /// Gate for the platform this binary was built for
    pub fn current() -> Self {
        Self::new(std::env::consts::OS)
    }
}

#[async_trait]
impl VpnGate for UnsupportedGate {
    async fn acquire(&self) -> bool {
        tracing::error!(platform = %self.platform, "Unsupported platform for VPN");
        false
    }

    async fn release(&self) {}

    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn dials(&self) -> bool {
        false
    }

    fn failure_message(&self) -> String {
        "Unsupported platform for VPN.".to_string()
    }
}
