#![deny(unsafe_code)]
//! RTC wrapper and timestamp operations

use core::cell::RefCell;
use core::sync::atomic::Ordering;

use critical_section::Mutex;
use defmt::{info, warn, Format};
use embassy_stm32::rtc::{DateTime, DayOfWeek, Rtc};
use hal_abstractions::WallClock;
use node_core::CalendarTime;

use crate::ccmram::TIME_SYNCED;

const SECONDS_PER_DAY: u64 = 86_400;

/// Global internal RTC instance
static RTC: Mutex<RefCell<Option<Rtc>>> = Mutex::new(RefCell::new(None));

/// Timestamp with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct Timestamp {
    /// Unix timestamp in seconds since epoch (1970-01-01 00:00:00 UTC)
    pub unix_secs: u64,
    /// Microseconds component (0-999,999)
    pub micros: u32,
}

impl Timestamp {
    pub const fn new(unix_secs: u64, micros: u32) -> Self {
        Self { unix_secs, micros }
    }

    /// Convert from NTP timestamp (seconds since 1900-01-01)
    pub fn from_ntp(ntp_secs: u64, ntp_frac: u32) -> Self {
        /// NTP epoch offset (1900-01-01 to 1970-01-01 in seconds)
        const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

        let unix_secs = ntp_secs.saturating_sub(NTP_UNIX_OFFSET);
        // NTP fraction is in units of 2^-32 s
        let micros = ((ntp_frac as u64 * 1_000_000) >> 32) as u32;
        Self::new(unix_secs, micros)
    }

    /// Advance by `micros`, carrying into seconds
    pub fn add_micros(self, micros: u64) -> Self {
        let total = self.micros as u64 + micros;
        Self::new(
            self.unix_secs.saturating_add(total / 1_000_000),
            (total % 1_000_000) as u32,
        )
    }
}

/// RTC operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum RtcError {
    /// RTC not initialized, or not synchronized yet
    NotInitialized,
    /// RTC hardware error
    HardwareError,
}

/// Hand the RTC to the time system; call once from `init`
pub fn initialize_rtc(rtc: Rtc) {
    critical_section::with(|cs| {
        RTC.borrow(cs).replace(Some(rtc));
    });
    info!("Internal RTC initialized");
}

/// `true` once at least one SNTP sync reached the RTC
pub fn is_time_synced() -> bool {
    TIME_SYNCED.load(Ordering::Acquire)
}

/// Write timestamp to the RTC
///
/// Only sets the sync flag if the write succeeds.
pub fn write_rtc(timestamp: Timestamp) -> Result<(), RtcError> {
    let datetime = to_datetime(timestamp.unix_secs)?;

    critical_section::with(|cs| {
        let mut rtc = RTC.borrow(cs).borrow_mut();
        let rtc = rtc.as_mut().ok_or(RtcError::NotInitialized)?;
        rtc.set_datetime(datetime)
            .map_err(|_| RtcError::HardwareError)?;
        TIME_SYNCED.store(true, Ordering::Release);
        Ok(())
    })
}

/// Read the RTC; fails until the first sync
pub fn read_rtc() -> Result<Timestamp, RtcError> {
    if !is_time_synced() {
        return Err(RtcError::NotInitialized);
    }

    critical_section::with(|cs| {
        let rtc = RTC.borrow(cs).borrow();
        let rtc = rtc.as_ref().ok_or(RtcError::NotInitialized)?;
        let dt = rtc.now().map_err(|_| RtcError::HardwareError)?;
        let calendar = CalendarTime {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
        };
        // 1-second resolution
        Ok(Timestamp::new(calendar.to_unix(), 0))
    })
}

fn to_datetime(unix_secs: u64) -> Result<DateTime, RtcError> {
    let c = CalendarTime::from_unix(unix_secs);
    DateTime::from(
        c.year,
        c.month,
        c.day,
        day_of_week(unix_secs),
        c.hour,
        c.minute,
        c.second,
        0,
    )
    .map_err(|_| RtcError::HardwareError)
}

/// 1970-01-01 was a Thursday
fn day_of_week(unix_secs: u64) -> DayOfWeek {
    match (unix_secs / SECONDS_PER_DAY + 3) % 7 {
        0 => DayOfWeek::Monday,
        1 => DayOfWeek::Tuesday,
        2 => DayOfWeek::Wednesday,
        3 => DayOfWeek::Thursday,
        4 => DayOfWeek::Friday,
        5 => DayOfWeek::Saturday,
        _ => DayOfWeek::Sunday,
    }
}

/// Node wall clock backed by the RTC
///
/// Reads 0 while unsynchronized, as the node tasks expect.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtcClock;

impl WallClock for RtcClock {
    fn now(&self) -> u64 {
        match read_rtc() {
            Ok(ts) => ts.unix_secs,
            Err(RtcError::NotInitialized) => 0,
            Err(e) => {
                warn!("Failed to read RTC: {:?}", e);
                0
            }
        }
    }
}
