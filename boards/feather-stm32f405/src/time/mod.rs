#![deny(unsafe_code)]
//! Wall-clock time on the internal RTC
//!
//! - The RTC runs from the 32.768 kHz LSE (±20-50 ppm)
//! - SNTP (see `network::sntp`) writes UTC into it; between syncs it keeps
//!   counting on its own
//! - Sync status is an atomic flag in CCM RAM
//! - Until the first sync the node clock reads 0 (1970-01-01)
//!
//! Calendar arithmetic lives in `node_core::calendar`.

mod rtc;

pub use rtc::{initialize_rtc, is_time_synced, write_rtc, RtcClock, RtcError, Timestamp};
