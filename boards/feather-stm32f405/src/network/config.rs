#![deny(unsafe_code)]
//! Network configuration structures

use crate::device_id;

/// SNTP client configuration
#[derive(Debug, Clone)]
pub struct SntpConfig {
    /// NTP servers to try (in order)
    pub servers: &'static [&'static str],
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Number of retry attempts per server
    pub retry_count: usize,
    /// Pause between attempts in milliseconds
    pub retry_backoff_ms: u64,
    /// Maximum accepted stratum level (1-15)
    pub max_stratum: u8,
    /// Seconds between resynchronizations
    pub resync_interval_secs: u64,
}

impl Default for SntpConfig {
    fn default() -> Self {
        Self {
            servers: &["pool.ntp.org", "time.google.com", "time.cloudflare.com"],
            timeout_ms: 5000,
            retry_count: 3,
            retry_backoff_ms: 2000,
            max_stratum: 3,
            resync_interval_secs: 15 * 60,
        }
    }
}

/// Network stack configuration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// MAC address for Ethernet
    pub mac_addr: [u8; 6],
    /// Random seed for network stack
    pub seed: u64,
}

impl NetworkConfig {
    /// Addresses derived from this chip's unique ID
    pub fn for_this_device() -> Self {
        let uid = device_id::uid();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&uid[4..]);
        Self {
            mac_addr: device_id::mac_address(),
            seed: u64::from_le_bytes(seed),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mac_addr: [0x02, 0x00, 0x00, 0x12, 0x34, 0x56],
            seed: 0x1234_5678_u64,
        }
    }
}
