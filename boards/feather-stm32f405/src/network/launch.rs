#![deny(unsafe_code)]
//! Service start signals
//!
//! The console, the server work loop and SNTP are futures inside the
//! network task, parked on these signals until something releases them.
//! "Spawning" one of them is raising its signal.

use defmt::info;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use hal_abstractions::{ConsoleConfig, ServiceLauncher, SpawnError};

/// Releases the command console with its configuration
pub static CONSOLE_START: Signal<CriticalSectionRawMutex, ConsoleConfig> = Signal::new();
/// Releases the server work loop
pub static SERVER_START: Signal<CriticalSectionRawMutex, ()> = Signal::new();
/// Releases the SNTP client
pub static TIME_SYNC_START: Signal<CriticalSectionRawMutex, ()> = Signal::new();

fn release<T: Send>(signal: &Signal<CriticalSectionRawMutex, T>, value: T) -> Result<(), SpawnError> {
    if signal.signaled() {
        return Err(SpawnError::AlreadyRunning);
    }
    signal.signal(value);
    Ok(())
}

/// [`ServiceLauncher`] over the start signals
#[derive(Debug, Default)]
pub struct SignalLauncher;

impl ServiceLauncher for SignalLauncher {
    fn start_console(&mut self, config: &ConsoleConfig) -> Result<(), SpawnError> {
        release(&CONSOLE_START, *config)?;
        info!("console released on UDP port {}", config.port);
        Ok(())
    }

    fn spawn_server_work(&mut self) -> Result<(), SpawnError> {
        release(&SERVER_START, ())?;
        info!("server work released");
        Ok(())
    }
}

/// Release the SNTP client
pub fn start_time_sync() -> Result<(), SpawnError> {
    release(&TIME_SYNC_START, ())
}
