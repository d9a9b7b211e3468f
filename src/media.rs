//! The sector/track data model and the filesystem I/O vtable (`MediaIo`)
//! the FAT engine is built against.

use generic_array::GenericArray;
use typenum::consts::U512;

use crate::SECTORS_PER_TRACK;

/// A sector's raw payload, sized to the medium's fixed 512-byte sectors.
pub type SectorData = GenericArray<u8, U512>;

/// A 512-byte sector, identified by (cylinder, head, 1-based sector#).
///
/// Transient: materialized per read/decode, never persisted as a standalone
/// value.
#[derive(Clone)]
pub struct Sector {
    pub cylinder: u8,
    pub head: u8,
    /// 1-based, per IBM System/34 convention.
    pub sector_n: u8,
    /// Fixed at 2 (512 bytes) on this medium.
    pub size_code: u8,
    /// True when CRC matched on read, or the sector is freshly staged for
    /// write.
    pub valid: bool,
    pub data: GenericArray<u8, U512>,
}

impl Sector {
    pub fn blank(cylinder: u8, head: u8, sector_n: u8) -> Self {
        Self {
            cylinder,
            head,
            sector_n,
            size_code: 2,
            valid: false,
            data: GenericArray::default(),
        }
    }
}

/// An ordered sequence of 18 sectors sharing one (cylinder, head).
///
/// Invariant: every contained sector's `cylinder`/`head` equals the track's.
#[derive(Clone)]
pub struct Track {
    pub cylinder: u8,
    pub head: u8,
    pub sectors: [Sector; SECTORS_PER_TRACK],
}

impl Track {
    pub fn blank(cylinder: u8, head: u8) -> Self {
        Self {
            cylinder,
            head,
            sectors: core::array::from_fn(|i| Sector::blank(cylinder, head, i as u8 + 1)),
        }
    }

    pub fn all_valid(&self) -> bool {
        self.sectors.iter().all(|s| s.valid)
    }
}

/// The filesystem-I/O vtable the FAT engine is built against.
///
/// Implementors supply sector-granularity reads and whole-track writes; the
/// drive fills any sectors the caller left unset on write.
pub trait MediaIo {
    /// Populates `sector.data`/`sector.valid` for the (cylinder, head,
    /// sector#) already set on `sector`.
    fn read(&mut self, sector: &mut Sector) -> bool;

    /// Writes a whole track. Sectors left `valid = false` are filled in by
    /// reading the existing track content first.
    fn write(&mut self, track: &mut Track) -> bool;

    /// Latched disk-change state; clearing it is the implementor's duty
    /// (e.g. as a side effect of the recalibration step it performs).
    fn disk_changed(&mut self) -> bool;

    fn write_protected(&mut self) -> bool;
}
