//! Scheduler collaborators: task creation and priority control

/// A task could not be created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpawnError {
    /// The task is already running
    AlreadyRunning,
    /// The scheduler has no room for another task
    NoCapacity,
}

impl core::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "task already running"),
            Self::NoCapacity => write!(f, "no capacity for task"),
        }
    }
}

impl core::error::Error for SpawnError {}

/// Starts the telemetry logger task on a mounted volume
pub trait LogTaskSpawner<V> {
    fn spawn_logger(&mut self, volume: V) -> Result<(), SpawnError>;
}

/// Priority control over the calling task
pub trait PriorityControl {
    /// Drop the calling task to the lowest (idle) priority
    fn lower_to_idle(&mut self);
}
