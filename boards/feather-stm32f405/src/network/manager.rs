#![deny(unsafe_code)]
//! Link supervision
//!
//! Turns embassy-net configuration changes into [`NetworkEvent`]s for the
//! activation gate.

use defmt::{info, warn};
use embassy_net::Stack;
use hal_abstractions::{NetworkEvent, ServiceLauncher};
use node_core::{Activation, NetworkActivationGate};

/// Wait for network configuration (DHCP) and log IP address
pub async fn wait_for_config(stack: Stack<'_>) {
    info!("Waiting for DHCP...");
    stack.wait_config_up().await;
    info!("Network is UP!");

    if let Some(config) = stack.config_v4() {
        let ip = config.address.address();
        let octets = ip.octets();
        info!(
            "IP: {}.{}.{}.{}",
            octets[0], octets[1], octets[2], octets[3]
        );

        if let Some(gateway) = config.gateway {
            let gw_octets = gateway.octets();
            info!(
                "Gateway: {}.{}.{}.{}",
                gw_octets[0], gw_octets[1], gw_octets[2], gw_octets[3]
            );
        }
    }
}

/// Feed every up/down transition to `gate`, forever
pub async fn watch_link<L: ServiceLauncher>(
    stack: Stack<'_>,
    gate: &NetworkActivationGate,
    launcher: &mut L,
) -> ! {
    loop {
        wait_for_config(stack).await;
        match gate.on_network_event(NetworkEvent::Up, launcher) {
            Ok(Activation::Activated) => info!("network services activated"),
            Ok(_) => {}
            Err(e) => warn!("network services not started: {}", e),
        }

        stack.wait_config_down().await;
        warn!("Network is DOWN");
        // Down never fails
        let _ = gate.on_network_event(NetworkEvent::Down, launcher);
    }
}
