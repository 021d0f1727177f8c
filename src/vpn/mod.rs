//! VPN gate
//!
//! The portal only serves Scopus to clients inside the institution's
//! network, so every export workflow runs behind a freshly dialed tunnel.
//! The gate is a capability with one implementation per platform, selected
//! once at startup:
//!
//! - [`PppGate`]: Linux `pon`/`poff` with a verification probe via `ip`
//! - [`RasdialGate`]: Windows `rasdial`
//! - [`DisabledGate`]: no dialing, for hosts already inside the network
//! - [`UnsupportedGate`]: every acquire fails

mod command;
mod fixed;
mod ppp;
mod rasdial;
mod traits;

pub use command::{CommandOutput, CommandRunner, TokioCommandRunner};
pub use fixed::{DisabledGate, UnsupportedGate};
pub use ppp::{PppGate, PppTools};
pub use rasdial::{RasdialGate, SUCCESS_MARKER};
pub use traits::VpnGate;

use std::sync::Arc;

use crate::config::{VpnConfig, VpnStrategy};

/// The strategy `Auto` resolves to on this platform, if any
pub fn platform_strategy() -> Option<VpnStrategy> {
    if cfg!(target_os = "linux") {
        Some(VpnStrategy::Ppp)
    } else if cfg!(windows) {
        Some(VpnStrategy::Rasdial)
    } else {
        None
    }
}

/// Build the gate described by the configuration
pub fn gate_from_config(config: &VpnConfig) -> Arc<dyn VpnGate> {
    gate_with_runner(config, Arc::new(TokioCommandRunner))
}

/// Build the gate described by the configuration around a specific runner
pub fn gate_with_runner(config: &VpnConfig, runner: Arc<dyn CommandRunner>) -> Arc<dyn VpnGate> {
    let strategy = match config.strategy {
        VpnStrategy::Auto => platform_strategy(),
        other => Some(other),
    };

    let gate: Arc<dyn VpnGate> = match strategy {
        Some(VpnStrategy::Ppp) => Arc::new(PppGate::new(config, PppTools::resolve(config), runner)),
        Some(VpnStrategy::Rasdial) => Arc::new(RasdialGate::new(config, runner)),
        Some(VpnStrategy::Disabled) => Arc::new(DisabledGate),
        Some(VpnStrategy::Unsupported) | Some(VpnStrategy::Auto) | None => {
            Arc::new(UnsupportedGate::current())
        }
    };

    tracing::info!(gate = gate.name(), "VPN gate selected");
    gate
}
