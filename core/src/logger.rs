//! Telemetry logger
//!
//! Appends one timestamped temperature record to a file per period:
//!
//! ```text
//! Idle -> Opening -> Writing -> Closing -> Idle
//! ```
//!
//! The file is opened and closed inside every cycle and never held open
//! across the period delay. A cycle whose open fails is dropped; the next
//! period tries again.

use core::fmt::Write as _;

use embedded_hal_async::delay::DelayNs;
use embedded_io::Write;
use hal_abstractions::{OpenMode, StorageError, Volume, WallClock};
use heapless::String;

use crate::calendar::CalendarTime;
use crate::config::LoggerConfig;
use crate::convert::{raw_to_celsius, Measurement, NtcCalibration};
use crate::sampler::SampleSource;

/// Capacity of one formatted record
pub const RECORD_CAPACITY: usize = 80;

/// Where the logger is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoggerState {
    Idle,
    Opening,
    Writing,
    Closing,
}

/// Counters kept across cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoggerStats {
    pub cycles: u32,
    pub records: u32,
    pub opens: u32,
    pub closes: u32,
    pub open_failures: u32,
    pub write_failures: u32,
    pub close_failures: u32,
    /// Records written with an invalid measurement
    pub invalid: u32,
}

/// Format one log line: `D/M/YYYY,HH:MM:SS,<value>\r\n`
///
/// Hours are space padded, minutes and seconds zero padded.
pub fn format_record(
    time: &CalendarTime,
    measurement: Measurement,
) -> Result<String<RECORD_CAPACITY>, core::fmt::Error> {
    let mut line = String::new();
    write!(
        line,
        "{}/{}/{},{:2}:{:02}:{:02},{}\r\n",
        time.day, time.month, time.year, time.hour, time.minute, time.second, measurement
    )?;
    Ok(line)
}

/// Periodic append-only temperature logger
pub struct TelemetryLogger<V, S, C, D> {
    volume: V,
    source: S,
    clock: C,
    delay: D,
    calibration: NtcCalibration,
    config: LoggerConfig,
    state: LoggerState,
    stats: LoggerStats,
}

impl<V, S, C, D> TelemetryLogger<V, S, C, D>
where
    V: Volume,
    S: SampleSource,
    C: WallClock,
    D: DelayNs,
{
    pub fn new(
        volume: V,
        source: S,
        clock: C,
        delay: D,
        calibration: NtcCalibration,
        config: LoggerConfig,
    ) -> Self {
        Self {
            volume,
            source,
            clock,
            delay,
            calibration,
            config,
            state: LoggerState::Idle,
            stats: LoggerStats::default(),
        }
    }

    pub fn state(&self) -> LoggerState {
        self.state
    }

    pub fn stats(&self) -> LoggerStats {
        self.stats
    }

    /// Run one open / write / close cycle
    ///
    /// Returns the error that dropped the record, if any. Failures are
    /// already counted and logged; the caller only needs to wait for the
    /// next period.
    pub async fn run_cycle(&mut self) -> Result<(), StorageError> {
        self.stats.cycles += 1;

        self.state = LoggerState::Opening;
        let mut file = match self.volume.open(self.config.path, OpenMode::Append) {
            Ok(file) => file,
            Err(e) => {
                self.stats.open_failures += 1;
                warn!("log file {} not opened: {}", self.config.path, e);
                self.state = LoggerState::Idle;
                return Err(e);
            }
        };
        self.stats.opens += 1;

        self.state = LoggerState::Writing;
        let now = CalendarTime::from_unix(self.clock.now());
        let measurement = match self.source.sample().await {
            Ok(sample) => raw_to_celsius(sample.raw, sample.raw_max, &self.calibration),
            Err(e) => {
                warn!("logger sample failed: {}", e);
                Measurement::Invalid
            }
        };
        if !measurement.is_valid() {
            self.stats.invalid += 1;
        }

        let written = match format_record(&now, measurement) {
            Ok(line) => write_fully(&mut file, line.as_bytes()),
            Err(_) => Err(StorageError::NoSpace),
        };

        self.state = LoggerState::Closing;
        let closed = self.volume.close(file);
        self.stats.closes += 1;
        self.state = LoggerState::Idle;

        if let Err(e) = written {
            self.stats.write_failures += 1;
            warn!("log record dropped: {}", e);
            return Err(e);
        }
        if let Err(e) = closed {
            self.stats.close_failures += 1;
            warn!("log file close failed: {}", e);
            return Err(e);
        }

        self.stats.records += 1;
        debug!("logged record {}", self.stats.records);
        Ok(())
    }

    /// Log forever, one record per period
    ///
    /// `report` gets the counters after every cycle.
    pub async fn run<F: FnMut(LoggerStats)>(mut self, mut report: F) -> ! {
        info!(
            "telemetry logger started: {} every {} ms",
            self.config.path, self.config.period_ms
        );
        loop {
            // Failures are counted in stats; the next period retries
            let _ = self.run_cycle().await;
            report(self.stats);
            self.delay.delay_ms(self.config.period_ms).await;
        }
    }
}

pub(crate) fn write_fully<W: Write<Error = StorageError>>(
    file: &mut W,
    mut bytes: &[u8],
) -> Result<(), StorageError> {
    while !bytes.is_empty() {
        match file.write(bytes)? {
            0 => return Err(StorageError::NoSpace),
            n => bytes = &bytes[n..],
        }
    }
    Ok(())
}
