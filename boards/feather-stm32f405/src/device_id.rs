#![deny(unsafe_code)]
//! Device identifier utilities for STM32F405
//!
//! The factory-programmed 96-bit unique ID is stable across reboots and
//! unique to each chip; the node derives its Ethernet address from it.

/// Get the device UID bytes
pub fn uid() -> &'static [u8; 12] {
    embassy_stm32::uid::uid()
}

/// Get the STM32F405 unique device ID as a 24-character hex string
pub fn uid_hex() -> &'static str {
    embassy_stm32::uid::uid_hex()
}

/// Locally administered unicast MAC address for this chip
pub fn mac_address() -> [u8; 6] {
    mac_from_uid(uid())
}

/// Fold the 12 UID bytes into the low five bytes of the address
///
/// The first byte is fixed to 0x02 (locally administered, unicast).
fn mac_from_uid(uid: &[u8; 12]) -> [u8; 6] {
    let mut mac = [0x02, 0, 0, 0, 0, 0];
    for (i, byte) in uid.iter().enumerate() {
        mac[1 + i % 5] ^= byte;
    }
    mac
}
