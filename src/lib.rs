//! Firmware stack for an IBM-PC-compatible 3.5" HD floppy controller: flux
//! capture/emit, an MFM codec, a FAT12 engine, and a POSIX-shaped file API
//! with a sector cache.

// Mark the crate as no_std if the feature is enabled (and only)
#![cfg_attr(all(feature = "no_std", not(test)), no_std)]

#[allow(unused_extern_crates)]
extern crate core; // makes rls actually look into the standard library (hack)

#[cfg_attr(target_os = "none", panic_handler)]
#[cfg(target_os = "none")]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

macro_rules! using_std { ($($i:item)*) => ($(#[cfg(not(feature = "no_std"))]$i)*) }

pub mod mutex;
pub mod error;
pub mod media;
pub mod hal;
pub mod mfm;
pub mod flux;
pub mod fat;
pub mod cache;
pub mod fs;

/// Bytes in one sector; fixed by the medium.
pub const SECTOR_SIZE: usize = 512;
/// Sectors per track on 1.44 MB media.
pub const SECTORS_PER_TRACK: usize = 18;
/// Cylinders on 1.44 MB media.
pub const CYLINDERS: usize = 80;
/// Read/write heads (sides).
pub const HEADS: usize = 2;
/// Total sectors on the medium (80 * 2 * 18).
pub const TOTAL_SECTORS: usize = CYLINDERS * HEADS * SECTORS_PER_TRACK;
