//! Node configuration structures
//!
//! Fixed at compile time; boards start from `NodeConfig::default()` and
//! override what their hardware needs.

use core::net::{Ipv4Addr, SocketAddrV4};

use hal_abstractions::{ConsoleConfig, ServerEntry, ServerKind, VolumeGeometry};

use crate::convert::NtcCalibration;
use crate::sampler::ChannelSelector;

/// Potentiometer, channel 0 of the sensor group
pub const POT_CHANNEL: ChannelSelector = ChannelSelector::new(0, 0);
/// NTC divider, channel 1 of the sensor group
pub const NTC_CHANNEL: ChannelSelector = ChannelSelector::new(0, 1);

/// RAM volume configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Mount name of the volume
    pub volume_name: &'static str,
    pub geometry: VolumeGeometry,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            volume_name: "/ram",
            geometry: VolumeGeometry {
                sector_size: 512,
                sector_count: (200 * 1024) / 512,
                cache_size: 15 * 512,
            },
        }
    }
}

/// Telemetry logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Append-only record file
    pub path: &'static str,
    /// Delay between two records, in milliseconds
    pub period_ms: u32,
    /// Channel converted into each record
    pub channel: ChannelSelector,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            path: "/ram/logfile.txt",
            period_ms: 60_000,
            channel: NTC_CHANNEL,
        }
    }
}

/// How the publisher hands datagrams to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitDiscipline {
    /// Stack copies the payload out of a local buffer
    Copy,
    /// Payload is written into a stack-owned buffer that is handed over
    Handoff,
}

/// What a datagram carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadFormat {
    /// Converted temperature, two decimals (`nan` when invalid)
    Celsius,
    /// Raw ADC code
    RawCount,
}

impl PayloadFormat {
    /// Channel of the sensor group this format is meant for
    pub const fn default_channel(self) -> ChannelSelector {
        match self {
            Self::Celsius => NTC_CHANNEL,
            Self::RawCount => POT_CHANNEL,
        }
    }
}

/// Telemetry publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub destination: SocketAddrV4,
    pub discipline: TransmitDiscipline,
    pub format: PayloadFormat,
    pub channel: ChannelSelector,
    /// Delay between two sends while online, in milliseconds
    pub send_interval_ms: u32,
    /// Delay between two address checks while offline, in milliseconds
    pub offline_backoff_ms: u32,
    /// Longest wait for a handoff buffer, in milliseconds
    pub buffer_wait_ms: u32,
}

impl PublisherConfig {
    /// Reference cadence for `discipline`
    ///
    /// The channel follows the payload format: raw counts come from the
    /// potentiometer, Celsius values from the NTC divider.
    pub fn for_discipline(discipline: TransmitDiscipline) -> Self {
        let (send_interval_ms, format) = match discipline {
            TransmitDiscipline::Copy => (10, PayloadFormat::RawCount),
            TransmitDiscipline::Handoff => (100, PayloadFormat::Celsius),
        };
        Self {
            destination: SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 4), 10080),
            discipline,
            format,
            channel: format.default_channel(),
            send_interval_ms,
            offline_backoff_ms: 1000,
            buffer_wait_ms: 1000,
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self::for_discipline(TransmitDiscipline::Copy)
    }
}

/// Server work loop configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Servers multiplexed by the work loop, in creation order
    pub servers: &'static [ServerEntry],
    /// Longest a single work call may block, in milliseconds
    pub max_wait_ms: u32,
}

/// HTTP on 80 serving the web root, FTP on 21 serving the volume root
pub const DEFAULT_SERVERS: [ServerEntry; 2] = [
    ServerEntry {
        kind: ServerKind::Http,
        port: 80,
        backlog: 10,
        root: "/ram/web",
    },
    ServerEntry {
        kind: ServerKind::Ftp,
        port: 21,
        backlog: 10,
        root: "",
    },
];

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            servers: &DEFAULT_SERVERS,
            max_wait_ms: 200,
        }
    }
}

/// Complete node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub calibration: NtcCalibration,
    pub storage: StorageConfig,
    pub logger: LoggerConfig,
    pub publisher: PublisherConfig,
    pub console: ConsoleConfig,
    pub services: ServiceConfig,
    /// Liveness indicator toggle period, in milliseconds
    pub heartbeat_period_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            calibration: NtcCalibration::default(),
            storage: StorageConfig::default(),
            logger: LoggerConfig::default(),
            publisher: PublisherConfig::default(),
            console: ConsoleConfig::new(5001, 2048, 1),
            services: ServiceConfig::default(),
            heartbeat_period_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_volume_geometry() {
        let storage = StorageConfig::default();
        assert_eq!(storage.geometry.sector_count, 400);
        assert_eq!(storage.geometry.region_len(), 200 * 1024);
        assert!(storage.geometry.validate().is_ok());
    }

    #[test]
    fn test_discipline_cadence() {
        let copy = PublisherConfig::for_discipline(TransmitDiscipline::Copy);
        let handoff = PublisherConfig::for_discipline(TransmitDiscipline::Handoff);
        assert_eq!(copy.send_interval_ms, 10);
        assert_eq!(handoff.send_interval_ms, 100);
        assert_eq!(copy.offline_backoff_ms, 1000);
        assert_eq!(copy.destination.port(), 10080);
    }

    #[test]
    fn test_publisher_channel_follows_format() {
        let copy = PublisherConfig::for_discipline(TransmitDiscipline::Copy);
        let handoff = PublisherConfig::for_discipline(TransmitDiscipline::Handoff);
        assert_eq!(copy.format, PayloadFormat::RawCount);
        assert_eq!(copy.channel, POT_CHANNEL);
        assert_eq!(handoff.format, PayloadFormat::Celsius);
        assert_eq!(handoff.channel, NTC_CHANNEL);
        assert_eq!(handoff.channel, LoggerConfig::default().channel);
    }

    #[test]
    fn test_default_servers() {
        let services = ServiceConfig::default();
        assert_eq!(services.max_wait_ms, 200);
        assert_eq!(services.servers.len(), 2);
        assert_eq!(services.servers[0].kind, ServerKind::Http);
        assert_eq!(services.servers[1].port, 21);
    }
}
