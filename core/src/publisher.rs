//! Telemetry publisher
//!
//! Streams readings as short ASCII datagrams to a fixed endpoint while the
//! interface has an address. Every attempt first checks the assigned
//! address; while there is none the publisher backs off and sends nothing.
//!
//! Copy discipline formats into a local buffer the stack duplicates.
//! Handoff discipline writes straight into a stack buffer and gives it
//! away; a failed handoff returns the buffer, which is released here
//! exactly once.

use core::fmt::Write as _;

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::DatagramStack;
use heapless::String;

use crate::config::{PayloadFormat, PublisherConfig, TransmitDiscipline};
use crate::convert::{raw_to_celsius, Measurement, NtcCalibration};
use crate::error::FatalError;
use crate::sampler::{Sample, SampleSource, SamplerError};

/// Capacity of one datagram payload
pub const PAYLOAD_CAPACITY: usize = 24;

/// Result of one publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishOutcome {
    /// Stack accepted this many bytes
    Sent(usize),
    /// No address assigned; nothing was sent
    Offline,
    /// Stack accepted zero bytes
    Dropped,
    /// No handoff buffer became free in time
    BufferTimeout,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublisherStats {
    pub sent: u32,
    pub offline_polls: u32,
    pub send_failures: u32,
    /// Handoff buffers returned to the stack after a failed send
    pub released_buffers: u32,
    pub buffer_timeouts: u32,
}

/// Render a reading as the datagram payload, `\r\n` terminated
pub fn format_payload(
    format: PayloadFormat,
    sample: Result<Sample, SamplerError>,
    calibration: &NtcCalibration,
) -> String<PAYLOAD_CAPACITY> {
    let mut payload = String::new();
    let formatted = match (format, sample) {
        (PayloadFormat::RawCount, Ok(sample)) => write!(payload, "{}\r\n", sample.raw),
        (PayloadFormat::Celsius, Ok(sample)) => write!(
            payload,
            "{}\r\n",
            raw_to_celsius(sample.raw, sample.raw_max, calibration)
        ),
        (_, Err(_)) => write!(payload, "{}\r\n", Measurement::Invalid),
    };
    if formatted.is_err() {
        // Value wider than a datagram; send the invalid marker instead
        payload.clear();
        let _ = payload.push_str("nan\r\n");
    }
    payload
}

/// Periodic datagram sender
pub struct TelemetryPublisher<N: DatagramStack, S, D> {
    stack: N,
    socket: N::Socket,
    source: S,
    delay: D,
    calibration: NtcCalibration,
    config: PublisherConfig,
    online: bool,
    stats: PublisherStats,
}

impl<N, S, D> TelemetryPublisher<N, S, D>
where
    N: DatagramStack,
    S: SampleSource,
    D: DelayNs,
{
    /// Open the publisher socket
    ///
    /// A stack that cannot give us a socket is a fatal error.
    pub fn start(
        mut stack: N,
        source: S,
        delay: D,
        calibration: NtcCalibration,
        config: PublisherConfig,
    ) -> Result<Self, FatalError> {
        let socket = stack.open_socket().map_err(|e| {
            error!("publisher socket unavailable: {}", e);
            FatalError::SocketCreate(e)
        })?;

        Ok(Self {
            stack,
            socket,
            source,
            delay,
            calibration,
            config,
            online: false,
            stats: PublisherStats::default(),
        })
    }

    pub fn stats(&self) -> PublisherStats {
        self.stats
    }

    /// Send one reading if the interface has an address
    pub async fn publish_once(&mut self) -> PublishOutcome {
        if self.stack.assigned_address().is_none() {
            if self.online {
                info!("address lost, publisher offline");
                self.online = false;
            }
            self.stats.offline_polls += 1;
            return PublishOutcome::Offline;
        }
        if !self.online {
            info!(
                "address assigned, publishing to port {}",
                self.config.destination.port()
            );
            self.online = true;
        }

        let sample = self.source.sample().await;
        let payload = format_payload(self.config.format, sample, &self.calibration);

        let outcome = match self.config.discipline {
            TransmitDiscipline::Copy => self.send_copy(payload.as_bytes()).await,
            TransmitDiscipline::Handoff => self.send_handoff(payload.as_bytes()).await,
        };
        match outcome {
            PublishOutcome::Sent(_) => self.stats.sent += 1,
            PublishOutcome::Dropped => {
                self.stats.send_failures += 1;
                warn!("datagram dropped by stack");
            }
            PublishOutcome::BufferTimeout => {
                self.stats.buffer_timeouts += 1;
                warn!(
                    "no send buffer within {} ms",
                    self.config.buffer_wait_ms
                );
            }
            PublishOutcome::Offline => {}
        }
        outcome
    }

    async fn send_copy(&mut self, payload: &[u8]) -> PublishOutcome {
        let sent = self
            .stack
            .send_copy(&mut self.socket, payload, self.config.destination)
            .await;
        if sent == 0 {
            PublishOutcome::Dropped
        } else {
            PublishOutcome::Sent(sent)
        }
    }

    async fn send_handoff(&mut self, payload: &[u8]) -> PublishOutcome {
        let len = payload.len();
        let Some(mut buffer) = self
            .stack
            .acquire_send_buffer(len, self.config.buffer_wait_ms)
            .await
        else {
            return PublishOutcome::BufferTimeout;
        };

        if buffer.as_mut().len() < len {
            self.release(buffer);
            return PublishOutcome::Dropped;
        }
        buffer.as_mut()[..len].copy_from_slice(payload);

        match self
            .stack
            .send_handoff(&mut self.socket, buffer, len, self.config.destination)
            .await
        {
            Ok(sent) => PublishOutcome::Sent(sent),
            Err(buffer) => {
                self.release(buffer);
                PublishOutcome::Dropped
            }
        }
    }

    fn release(&mut self, buffer: N::Buffer) {
        self.stack.release_send_buffer(buffer);
        self.stats.released_buffers += 1;
    }

    /// Publish once, then wait the online interval or the offline back-off
    pub async fn run_cycle(&mut self) -> PublishOutcome {
        let outcome = self.publish_once().await;
        let wait_ms = match outcome {
            PublishOutcome::Offline => self.config.offline_backoff_ms,
            _ => self.config.send_interval_ms,
        };
        self.delay.delay_ms(wait_ms).await;
        outcome
    }

    /// Publish forever, handing the counters to `report` after every cycle
    pub async fn run<F: FnMut(PublisherStats)>(mut self, mut report: F) -> ! {
        info!(
            "telemetry publisher started, {} ms interval",
            self.config.send_interval_ms
        );
        loop {
            self.run_cycle().await;
            report(self.stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAdc, MockClock, MockDelay, MockStack};
    use crate::sampler::{ChannelSelector, DedicatedSensor, SensorSampler};
    use core::net::Ipv4Addr;
    use embassy_futures::block_on;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use hal_abstractions::NetError;

    type TestPublisher<'a> =
        TelemetryPublisher<&'a MockStack, DedicatedSensor<&'a MockAdc, &'a MockClock>, &'a MockDelay>;

    fn publisher<'a>(
        stack: &'a MockStack,
        adc: &'a MockAdc,
        clock: &'a MockClock,
        delay: &'a MockDelay,
        discipline: TransmitDiscipline,
    ) -> TestPublisher<'a> {
        let config = PublisherConfig::for_discipline(discipline);
        let sensor = DedicatedSensor::new(SensorSampler::new(adc, clock), config.channel);
        TelemetryPublisher::start(stack, sensor, delay, NtcCalibration::default(), config).unwrap()
    }

    // Potentiometer on channel 0, NTC divider on channel 1
    const POT_AND_NTC: [u16; 2] = [300, 2048];

    #[test]
    fn test_payload_formats() {
        let sample = Ok(Sample {
            raw: 2048,
            raw_max: 4095,
            timestamp: 0,
        });
        let cal = NtcCalibration::default();

        assert_eq!(
            format_payload(PayloadFormat::RawCount, sample, &cal).as_str(),
            "2048\r\n"
        );
        assert_eq!(
            format_payload(PayloadFormat::Celsius, sample, &cal).as_str(),
            "58.46\r\n"
        );

        let zero = Ok(Sample {
            raw: 0,
            raw_max: 4095,
            timestamp: 0,
        });
        assert_eq!(
            format_payload(PayloadFormat::Celsius, zero, &cal).as_str(),
            "nan\r\n"
        );

        let missing = Err(SamplerError::ChannelOutOfRange {
            channel: 3,
            converted: 2,
        });
        assert_eq!(
            format_payload(PayloadFormat::RawCount, missing, &cal).as_str(),
            "nan\r\n"
        );
    }

    #[test]
    fn test_socket_failure_is_fatal() {
        let stack = MockStack::new();
        stack.fail_socket(true);
        let adc = MockAdc::new(&[2048]);
        let clock = MockClock::new(0);
        let delay = MockDelay::new();
        let sensor = DedicatedSensor::new(SensorSampler::new(&adc, &clock), ChannelSelector::new(0, 0));

        let result = TelemetryPublisher::start(
            &stack,
            sensor,
            &delay,
            NtcCalibration::default(),
            PublisherConfig::default(),
        );
        assert!(matches!(
            result,
            Err(FatalError::SocketCreate(NetError::SocketUnavailable))
        ));
    }

    #[test]
    fn test_offline_backs_off_without_sending() {
        let stack = MockStack::new();
        let adc = MockAdc::new(&[2048]);
        let clock = MockClock::new(0);
        let delay = MockDelay::new();
        let mut publisher = publisher(&stack, &adc, &clock, &delay, TransmitDiscipline::Copy);

        for _ in 0..3 {
            assert_eq!(block_on(publisher.run_cycle()), PublishOutcome::Offline);
        }
        assert_eq!(stack.sends(), 0);
        assert_eq!(adc.conversions(), 0);
        assert_eq!(delay.calls(), vec![1000, 1000, 1000]);

        stack.assign_address(Some(Ipv4Addr::new(192, 168, 1, 50)));
        assert_eq!(block_on(publisher.run_cycle()), PublishOutcome::Sent(6));
        assert_eq!(block_on(publisher.run_cycle()), PublishOutcome::Sent(6));
        assert_eq!(stack.sends(), 2);
        assert_eq!(delay.calls(), vec![1000, 1000, 1000, 10, 10]);
        assert_eq!(publisher.stats().offline_polls, 3);
    }

    #[test]
    fn test_copy_sends_to_fixed_destination() {
        let stack = MockStack::new();
        stack.assign_address(Some(Ipv4Addr::new(10, 0, 0, 2)));
        let adc = MockAdc::new(&[1234]);
        let clock = MockClock::new(0);
        let delay = MockDelay::new();
        let mut publisher = publisher(&stack, &adc, &clock, &delay, TransmitDiscipline::Copy);

        block_on(publisher.publish_once());

        assert_eq!(stack.last_payload(), b"1234\r\n".to_vec());
        assert_eq!(
            stack.last_destination().unwrap().to_string(),
            "192.168.1.4:10080"
        );
    }

    #[test]
    fn test_copy_drop_is_counted() {
        let stack = MockStack::new();
        stack.assign_address(Some(Ipv4Addr::new(10, 0, 0, 2)));
        stack.accept_sends(false);
        let adc = MockAdc::new(&[1234]);
        let clock = MockClock::new(0);
        let delay = MockDelay::new();
        let mut publisher = publisher(&stack, &adc, &clock, &delay, TransmitDiscipline::Copy);

        assert_eq!(block_on(publisher.publish_once()), PublishOutcome::Dropped);
        assert_eq!(publisher.stats().send_failures, 1);
        assert_eq!(stack.acquired(), 0);
    }

    #[test]
    fn test_handoff_success_transfers_buffer() {
        let stack = MockStack::new();
        stack.assign_address(Some(Ipv4Addr::new(10, 0, 0, 2)));
        let adc = MockAdc::new(&POT_AND_NTC);
        let clock = MockClock::new(0);
        let delay = MockDelay::new();
        let mut publisher = publisher(&stack, &adc, &clock, &delay, TransmitDiscipline::Handoff);

        assert_eq!(block_on(publisher.run_cycle()), PublishOutcome::Sent(7));
        assert_eq!(stack.last_payload(), b"58.46\r\n".to_vec());
        assert_eq!(stack.acquired(), 1);
        assert_eq!(stack.consumed(), 1);
        assert_eq!(stack.released(), 0);
        assert_eq!(delay.calls(), vec![100]);
    }

    #[test]
    fn test_handoff_failure_releases_exactly_once() {
        let stack = MockStack::new();
        stack.assign_address(Some(Ipv4Addr::new(10, 0, 0, 2)));
        stack.accept_sends(false);
        let adc = MockAdc::new(&POT_AND_NTC);
        let clock = MockClock::new(0);
        let delay = MockDelay::new();
        let mut publisher = publisher(&stack, &adc, &clock, &delay, TransmitDiscipline::Handoff);

        for _ in 0..4 {
            assert_eq!(block_on(publisher.publish_once()), PublishOutcome::Dropped);
        }

        assert_eq!(stack.acquired(), 4);
        assert_eq!(stack.released(), 4);
        assert_eq!(stack.consumed(), 0);
        assert_eq!(stack.outstanding(), 0);
        assert_eq!(publisher.stats().released_buffers, 4);
    }

    #[test]
    fn test_handoff_buffer_timeout() {
        let stack = MockStack::new();
        stack.assign_address(Some(Ipv4Addr::new(10, 0, 0, 2)));
        stack.set_free_buffers(0);
        let adc = MockAdc::new(&POT_AND_NTC);
        let clock = MockClock::new(0);
        let delay = MockDelay::new();
        let mut publisher = publisher(&stack, &adc, &clock, &delay, TransmitDiscipline::Handoff);

        assert_eq!(
            block_on(publisher.publish_once()),
            PublishOutcome::BufferTimeout
        );
        assert_eq!(stack.last_buffer_wait(), Some(1000));
        assert_eq!(stack.sends(), 0);
        assert_eq!(stack.released(), 0);
        assert_eq!(publisher.stats().buffer_timeouts, 1);
    }

    #[test]
    fn test_copy_publishes_potentiometer_count() {
        let stack = MockStack::new();
        stack.assign_address(Some(Ipv4Addr::new(10, 0, 0, 2)));
        let adc = MockAdc::new(&POT_AND_NTC);
        let clock = MockClock::new(0);
        let delay = MockDelay::new();
        let mut publisher = publisher(&stack, &adc, &clock, &delay, TransmitDiscipline::Copy);

        block_on(publisher.publish_once());
        assert_eq!(stack.last_payload(), b"300\r\n".to_vec());
    }

    #[test]
    fn test_handoff_short_buffer_released_once() {
        let stack = MockStack::new();
        stack.assign_address(Some(Ipv4Addr::new(10, 0, 0, 2)));
        stack.shorten_buffers(true);
        let adc = MockAdc::new(&POT_AND_NTC);
        let clock = MockClock::new(0);
        let delay = MockDelay::new();
        let mut publisher = publisher(&stack, &adc, &clock, &delay, TransmitDiscipline::Handoff);

        assert_eq!(block_on(publisher.publish_once()), PublishOutcome::Dropped);
        assert_eq!(stack.acquired(), 1);
        assert_eq!(stack.released(), 1);
        assert_eq!(stack.consumed(), 0);
        assert_eq!(stack.sends(), 0);
        assert_eq!(stack.outstanding(), 0);
        assert_eq!(publisher.stats().released_buffers, 1);
        assert_eq!(publisher.stats().send_failures, 1);
    }

    #[test]
    fn test_run_reports_stats_every_cycle() {
        let stack = MockStack::new();
        stack.assign_address(Some(Ipv4Addr::new(10, 0, 0, 2)));
        let adc = MockAdc::new(&POT_AND_NTC);
        let clock = MockClock::new(0);
        let delay = MockDelay::new();
        let publisher = publisher(&stack, &adc, &clock, &delay, TransmitDiscipline::Handoff);

        let mut reports = Vec::new();
        // `run` never returns; the sink stops it after three cycles
        let stopped = catch_unwind(AssertUnwindSafe(|| {
            block_on(publisher.run(|stats| {
                reports.push(stats);
                if reports.len() == 3 {
                    panic!("stop after three cycles");
                }
            }))
        }));

        assert!(stopped.is_err());
        assert_eq!(
            reports.iter().map(|s| s.sent).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(delay.calls(), vec![100, 100, 100]);
        assert_eq!(stack.last_payload(), b"58.46\r\n".to_vec());
    }
}
