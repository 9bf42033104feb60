#![deny(unsafe_code)]
//! SNTP client keeping the RTC on UTC
//!
//! Started by the server work loop when the services come up; performs an
//! initial sync, then resynchronizes on a fixed interval.

use defmt::{error, info, warn, Debug2Format};
use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{with_timeout, Duration, Instant};
use rtic_monotonics::fugit::ExtU64;
use rtic_monotonics::Monotonic;

use crate::time::{write_rtc, RtcError, Timestamp};
use crate::Mono;

use super::config::SntpConfig;
use super::error::NetworkError;

const NTP_PORT: u16 = 123;
const NTP_PACKET_LEN: usize = 48;
/// LI=0, VN=3, Mode=3 (client)
const NTP_CLIENT_REQUEST: u8 = 0x1B;
/// Largest RTT/2 correction applied, in microseconds
const MAX_RTT_CORRECTION_US: u64 = 1_000_000;

impl From<RtcError> for NetworkError {
    fn from(e: RtcError) -> Self {
        match e {
            RtcError::NotInitialized => NetworkError::RtcNotInitialized,
            RtcError::HardwareError => NetworkError::RtcHardwareError,
        }
    }
}

pub struct SntpClient {
    config: SntpConfig,
}

impl SntpClient {
    pub fn new(config: SntpConfig) -> Self {
        Self { config }
    }

    /// Sync once, then every `resync_interval_secs`, forever
    pub async fn run(self, stack: Stack<'static>) -> ! {
        info!(
            "SNTP client started ({} s resync interval)",
            self.config.resync_interval_secs
        );
        loop {
            match self.sync(stack).await {
                Ok(ts) => info!(
                    "SNTP sync successful: {}.{:06} UTC (written to internal RTC)",
                    ts.unix_secs, ts.micros
                ),
                Err(e) => warn!("SNTP sync failed: {}", e),
            }
            Mono::delay(self.config.resync_interval_secs.secs()).await;
        }
    }

    /// Try every server in turn and write the first good answer to the RTC
    pub async fn sync(&self, stack: Stack<'static>) -> Result<Timestamp, NetworkError> {
        for server in self.config.servers {
            for attempt in 0..self.config.retry_count {
                info!(
                    "Attempting SNTP sync with {} (attempt {})",
                    server,
                    attempt + 1
                );
                match self.sntp_request(stack, server).await {
                    Ok(timestamp) => {
                        write_rtc(timestamp)?;
                        return Ok(timestamp);
                    }
                    Err(e) => {
                        warn!("SNTP request failed: {}, retrying...", e);
                        Mono::delay(self.config.retry_backoff_ms.millis()).await;
                    }
                }
            }
        }
        error!("All SNTP sync attempts failed");
        Err(NetworkError::AllServersFailed)
    }

    async fn sntp_request(
        &self,
        stack: Stack<'static>,
        server: &str,
    ) -> Result<Timestamp, NetworkError> {
        let server_ip = stack
            .dns_query(server, DnsQueryType::A)
            .await
            .map_err(|_| NetworkError::DnsError)?
            .first()
            .copied()
            .ok_or(NetworkError::DnsError)?;

        let server_endpoint = IpEndpoint::new(server_ip, NTP_PORT);
        info!("Resolved {} to {}", server, Debug2Format(&server_endpoint));

        let mut rx_meta = [PacketMetadata::EMPTY; 2];
        let mut rx_buffer = [0u8; 64];
        let mut tx_meta = [PacketMetadata::EMPTY; 2];
        let mut tx_buffer = [0u8; 64];
        let mut socket = UdpSocket::new(
            stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        socket.bind(0).map_err(|_| NetworkError::SocketError)?;

        let mut request = [0u8; NTP_PACKET_LEN];
        request[0] = NTP_CLIENT_REQUEST;
        let transmit_time = Instant::now();
        socket
            .send_to(&request, server_endpoint)
            .await
            .map_err(|_| NetworkError::SocketError)?;

        let mut response = [0u8; NTP_PACKET_LEN];
        let (recv_len, from) = with_timeout(
            Duration::from_millis(self.config.timeout_ms),
            socket.recv_from(&mut response),
        )
        .await
        .map_err(|_| NetworkError::Timeout)?
        .map_err(|_| NetworkError::SocketError)?;
        let rtt = Instant::now().duration_since(transmit_time);

        if recv_len < NTP_PACKET_LEN || from.endpoint.addr != server_ip {
            return Err(NetworkError::InvalidResponse);
        }

        let stratum = response[1];
        if stratum == 0 || stratum > self.config.max_stratum {
            warn!(
                "Invalid stratum {} (max {})",
                stratum, self.config.max_stratum
            );
            return Err(NetworkError::ServerError);
        }

        // Transmit timestamp, bytes 40..48
        let secs = u32::from_be_bytes([response[40], response[41], response[42], response[43]]);
        let frac = u32::from_be_bytes([response[44], response[45], response[46], response[47]]);

        let correction = (rtt.as_micros() / 2).min(MAX_RTT_CORRECTION_US);
        let timestamp = Timestamp::from_ntp(secs as u64, frac).add_micros(correction);

        info!(
            "NTP timestamp: {}.{:06} UTC (stratum {}, RTT correction: {} us)",
            timestamp.unix_secs, timestamp.micros, stratum, correction
        );
        Ok(timestamp)
    }
}

impl Default for SntpClient {
    fn default() -> Self {
        Self::new(SntpConfig::default())
    }
}
