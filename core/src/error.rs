//! Fatal error type
//!
//! A `FatalError` is a broken precondition the node cannot run without.
//! Components return it from construction and bring-up; the firmware
//! aborts on it.

use core::fmt;

use hal_abstractions::{NetError, ServiceError, SpawnError, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatalError {
    /// The storage volume could not be created
    VolumeInit(StorageError),
    /// The telemetry logger task could not be started
    LoggerSpawn(SpawnError),
    /// The publisher socket could not be created
    SocketCreate(NetError),
    /// The composed server could not be constructed
    ServerCreate(ServiceError),
    /// The server work loop was configured with a zero wait
    ZeroServerWait,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VolumeInit(e) => write!(f, "volume init failed: {}", e),
            Self::LoggerSpawn(e) => write!(f, "logger spawn failed: {}", e),
            Self::SocketCreate(e) => write!(f, "socket creation failed: {}", e),
            Self::ServerCreate(e) => write!(f, "server creation failed: {}", e),
            Self::ZeroServerWait => write!(f, "server work wait must be non-zero"),
        }
    }
}

impl core::error::Error for FatalError {}

impl From<StorageError> for FatalError {
    fn from(e: StorageError) -> Self {
        Self::VolumeInit(e)
    }
}

impl From<NetError> for FatalError {
    fn from(e: NetError) -> Self {
        Self::SocketCreate(e)
    }
}

impl From<ServiceError> for FatalError {
    fn from(e: ServiceError) -> Self {
        Self::ServerCreate(e)
    }
}
