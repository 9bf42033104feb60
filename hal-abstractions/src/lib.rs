//! Hardware abstraction traits for the sensor node firmware
//!
//! This crate defines the collaborators the node tasks talk to: the analog
//! front-end, the storage volume, the datagram stack, the service transport,
//! the wall clock and the scheduler. BSPs implement these traits; `node-core`
//! is generic over them.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod adc;
pub mod clock;
pub mod network;
pub mod services;
pub mod storage;
pub mod task;

pub use adc::{AnalogFrontEnd, ChannelGroup};
pub use clock::WallClock;
pub use network::{DatagramStack, NetError, NetworkEvent};
pub use services::{
    ConsoleConfig, ServerEntry, ServerHost, ServerKind, ServiceError, ServiceLauncher,
};
pub use storage::{
    BlockStorage, ContentSeeder, OpenMode, RamDiskArena, StorageError, Volume, VolumeGeometry,
};
pub use task::{LogTaskSpawner, PriorityControl, SpawnError};
