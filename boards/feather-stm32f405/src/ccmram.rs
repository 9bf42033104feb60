//! CCM RAM Memory Allocations Module
//!
//! This module is the **ONLY** place in the codebase where CCM RAM (Core-Coupled Memory)
//! section attributes are used. All `#[link_section = ".ccmram"]` attributes must live here.
//!
//! # CCM RAM Characteristics (STM32F405RG)
//!
//! - **Size**: 64 KB (0x1000_0000 - 0x1000_FFFF)
//! - **Access**: CPU only (no DMA access)
//! - **Performance**: Zero wait states
//! - **Section**: `.ccmram` is `NOLOAD` (see `memory.x`), contents are undefined at reset
//!
//! # Memory Budget
//!
//! ```text
//! CCM RAM (64KB):
//! ├─ RAM volume arena:         48KB (96 sectors of 512 bytes)
//! └─ Critical variables:        <1KB
//!     ├─ TIME_SYNCED flag:      1 byte
//!     └─ VOLUME_TAKEN flag:     1 byte
//! ```
//!
//! The volume driver formats the arena when it mounts it, so the undefined
//! reset contents never leak into files.
//!
//! # Safety Requirements
//!
//! When adding new CCM RAM allocations:
//! 1. **Verify total usage < 64 KB**
//! 2. **No DMA**: Data must not be used with DMA peripherals
//! 3. **Static lifetime**: Only `static` items (not stack allocations)
//! 4. **Document**: Update this module's header with new allocations

// NOTE: This is the ONLY module in the codebase that should NOT have
// #![deny(unsafe_code)] because it intentionally uses linker sections.

#![allow(unsafe_code)]

use core::sync::atomic::{AtomicBool, Ordering};

use hal_abstractions::VolumeGeometry;

/// Geometry of the RAM volume held in CCM RAM
pub const VOLUME_GEOMETRY: VolumeGeometry = VolumeGeometry {
    sector_size: 512,
    sector_count: 96,
    cache_size: 2 * 512,
};

const VOLUME_LEN: usize = VOLUME_GEOMETRY.region_len();

/// System time synchronization status
#[link_section = ".ccmram"]
pub static TIME_SYNCED: AtomicBool = AtomicBool::new(false);

/// Set once the volume arena has been handed out
#[link_section = ".ccmram"]
static VOLUME_TAKEN: AtomicBool = AtomicBool::new(false);

/// Backing store of the RAM volume
///
/// # Safety
/// - Only reachable through [`take_volume_region`], which hands it out once
/// - CPU-only access, never used with DMA
#[link_section = ".ccmram"]
static mut VOLUME_REGION: [u8; VOLUME_LEN] = [0; VOLUME_LEN];

/// Hand out the volume arena
///
/// Returns `None` on every call after the first.
pub fn take_volume_region() -> Option<&'static mut [u8]> {
    if VOLUME_TAKEN.swap(true, Ordering::AcqRel) {
        return None;
    }
    // SAFETY: the swap above lets exactly one caller through, so this is
    // the only reference ever created to VOLUME_REGION.
    Some(unsafe { &mut *core::ptr::addr_of_mut!(VOLUME_REGION) })
}

/// Reset the CCM RAM flags
///
/// `.ccmram` is not zeroed by the runtime; call once from `init` before
/// anything reads the flags.
pub fn reset_flags() {
    TIME_SYNCED.store(false, Ordering::Release);
    VOLUME_TAKEN.store(false, Ordering::Release);
}
