//! Boot sequence and liveness indicator

use embedded_hal::digital::StatefulOutputPin;
use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{
    BlockStorage, ContentSeeder, LogTaskSpawner, PriorityControl, RamDiskArena,
};

use crate::error::FatalError;

/// One-shot bring-up of storage and the logger task
///
/// 1. Create the RAM volume over the injected arena (fatal on failure)
/// 2. Seed baseline content (logged on failure)
/// 3. Hand the volume to a new logger task (fatal on failure)
/// 4. Drop the calling task to idle priority
pub struct BootOrchestrator<B, S, T, P> {
    storage: B,
    seeder: S,
    spawner: T,
    priority: P,
}

impl<B, S, T, P> BootOrchestrator<B, S, T, P>
where
    B: BlockStorage,
    S: ContentSeeder,
    T: LogTaskSpawner<B::Volume>,
    P: PriorityControl,
{
    pub fn new(storage: B, seeder: S, spawner: T, priority: P) -> Self {
        Self {
            storage,
            seeder,
            spawner,
            priority,
        }
    }

    pub fn bring_up(mut self, volume_name: &'static str, arena: RamDiskArena) -> Result<(), FatalError> {
        let geometry = arena.geometry();
        let volume = self
            .storage
            .init_volume(volume_name, arena)
            .map_err(|e| {
                error!("volume {} init failed: {}", volume_name, e);
                FatalError::VolumeInit(e)
            })?;
        info!(
            "volume {} ready: {} sectors of {} bytes",
            volume_name, geometry.sector_count, geometry.sector_size
        );

        if let Err(e) = self.seeder.seed(&volume, volume_name) {
            warn!("seeding {} failed: {}", volume_name, e);
        }

        self.spawner.spawn_logger(volume).map_err(|e| {
            error!("logger spawn failed: {}", e);
            FatalError::LoggerSpawn(e)
        })?;

        self.priority.lower_to_idle();
        debug!("boot task lowered to idle priority");
        Ok(())
    }
}

/// Toggles a visible indicator forever
pub struct Heartbeat<L, D> {
    led: L,
    delay: D,
    period_ms: u32,
}

impl<L: StatefulOutputPin, D: DelayNs> Heartbeat<L, D> {
    pub fn new(led: L, delay: D, period_ms: u32) -> Self {
        Self {
            led,
            delay,
            period_ms,
        }
    }

    pub async fn beat(&mut self) {
        if self.led.toggle().is_err() {
            warn!("heartbeat toggle failed");
        }
        self.delay.delay_ms(self.period_ms).await;
    }

    pub async fn run(mut self) -> ! {
        loop {
            self.beat().await;
        }
    }
}
