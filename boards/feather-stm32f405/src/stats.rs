#![deny(unsafe_code)]
//! Latest task statistics, published for the console

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use node_core::{LoggerStats, PublisherStats};

static LOGGER: Mutex<CriticalSectionRawMutex, Cell<Option<LoggerStats>>> =
    Mutex::new(Cell::new(None));
static PUBLISHER: Mutex<CriticalSectionRawMutex, Cell<Option<PublisherStats>>> =
    Mutex::new(Cell::new(None));

pub fn record_logger(stats: LoggerStats) {
    LOGGER.lock(|cell| cell.set(Some(stats)));
}

pub fn record_publisher(stats: PublisherStats) {
    PUBLISHER.lock(|cell| cell.set(Some(stats)));
}

/// `None` until the logger finishes its first cycle
pub fn logger() -> Option<LoggerStats> {
    LOGGER.lock(Cell::get)
}

/// `None` until the publisher finishes its first cycle
pub fn publisher() -> Option<PublisherStats> {
    PUBLISHER.lock(Cell::get)
}
