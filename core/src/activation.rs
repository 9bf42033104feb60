//! Network-gated service activation
//!
//! The network stack reports link-state changes from its own context. The
//! first `Up` event starts the command console and the server work loop;
//! every later event is a no-op. The one-shot transition is an atomic
//! compare-and-set on [`ActivationLatch`], so concurrent deliveries
//! cannot both win.

use core::sync::atomic::{AtomicBool, Ordering};

use hal_abstractions::{ConsoleConfig, NetworkEvent, ServiceLauncher, SpawnError};

/// Process-wide one-shot flag
#[derive(Debug)]
pub struct ActivationLatch {
    activated: AtomicBool,
}

impl ActivationLatch {
    pub const fn new() -> Self {
        Self {
            activated: AtomicBool::new(false),
        }
    }

    /// Set the latch; `true` for exactly one caller over the latch lifetime
    pub fn try_activate(&self) -> bool {
        self.activated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }
}

impl Default for ActivationLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// What a delivered event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activation {
    /// This event started the services
    Activated,
    /// Services were already started by an earlier event
    AlreadyActive,
    /// Event is not a link-up
    Ignored,
}

/// Starts network-facing services on the first link-up
#[derive(Debug)]
pub struct NetworkActivationGate {
    latch: ActivationLatch,
    console: ConsoleConfig,
}

impl NetworkActivationGate {
    pub const fn new(console: ConsoleConfig) -> Self {
        Self {
            latch: ActivationLatch::new(),
            console,
        }
    }

    pub fn is_activated(&self) -> bool {
        self.latch.is_activated()
    }

    /// Handle one link-state event
    ///
    /// Never blocks. The latch is set before anything is spawned and stays
    /// set even if a spawn fails, so services are attempted at most once.
    pub fn on_network_event<L: ServiceLauncher>(
        &self,
        event: NetworkEvent,
        launcher: &mut L,
    ) -> Result<Activation, SpawnError> {
        match event {
            NetworkEvent::Up => {}
            NetworkEvent::Down => {
                debug!("link down");
                return Ok(Activation::Ignored);
            }
        }

        if !self.latch.try_activate() {
            debug!("link up, services already active");
            return Ok(Activation::AlreadyActive);
        }

        info!("link up, starting console on port {}", self.console.port);
        launcher.start_console(&self.console).map_err(|e| {
            error!("console start failed: {}", e);
            e
        })?;
        launcher.spawn_server_work().map_err(|e| {
            error!("server work spawn failed: {}", e);
            e
        })?;

        Ok(Activation::Activated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLauncher;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    const CONSOLE: ConsoleConfig = ConsoleConfig::new(5001, 2048, 1);

    #[test]
    fn test_latch_sets_once() {
        let latch = ActivationLatch::new();
        assert!(!latch.is_activated());
        assert!(latch.try_activate());
        assert!(!latch.try_activate());
        assert!(latch.is_activated());
    }

    #[test]
    fn test_two_up_events_start_services_once() {
        let gate = NetworkActivationGate::new(CONSOLE);
        let mut launcher = MockLauncher::new();

        assert_eq!(
            gate.on_network_event(NetworkEvent::Up, &mut launcher),
            Ok(Activation::Activated)
        );
        assert_eq!(
            gate.on_network_event(NetworkEvent::Up, &mut launcher),
            Ok(Activation::AlreadyActive)
        );

        assert_eq!(launcher.consoles(), vec![CONSOLE]);
        assert_eq!(launcher.server_spawns(), 1);
    }

    #[test]
    fn test_console_starts_before_server_work() {
        let gate = NetworkActivationGate::new(CONSOLE);
        let mut launcher = MockLauncher::new();

        gate.on_network_event(NetworkEvent::Up, &mut launcher)
            .unwrap();
        assert_eq!(launcher.order(), vec!["console", "server"]);
    }

    #[test]
    fn test_down_is_ignored() {
        let gate = NetworkActivationGate::new(CONSOLE);
        let mut launcher = MockLauncher::new();

        assert_eq!(
            gate.on_network_event(NetworkEvent::Down, &mut launcher),
            Ok(Activation::Ignored)
        );
        assert!(!gate.is_activated());
        assert_eq!(launcher.server_spawns(), 0);

        gate.on_network_event(NetworkEvent::Up, &mut launcher)
            .unwrap();
        gate.on_network_event(NetworkEvent::Down, &mut launcher)
            .unwrap();
        gate.on_network_event(NetworkEvent::Up, &mut launcher)
            .unwrap();
        assert_eq!(launcher.server_spawns(), 1);
    }

    #[test]
    fn test_failed_spawn_is_not_retried() {
        let gate = NetworkActivationGate::new(CONSOLE);
        let mut launcher = MockLauncher::new();
        launcher.fail_server(SpawnError::NoCapacity);

        assert_eq!(
            gate.on_network_event(NetworkEvent::Up, &mut launcher),
            Err(SpawnError::NoCapacity)
        );
        assert_eq!(
            gate.on_network_event(NetworkEvent::Up, &mut launcher),
            Ok(Activation::AlreadyActive)
        );
        assert_eq!(launcher.consoles().len(), 1);
    }

    #[test]
    fn test_concurrent_up_events_activate_once() {
        let latch = Arc::new(ActivationLatch::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latch = Arc::clone(&latch);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if latch.try_activate() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
