//! The FAT12 boot sector: the on-disk BIOS Parameter Block and the
//! derived layout fields the rest of the engine works off of.
//!
//! Field docs are sourced from the DOS 2.0/3.31 BPB layout; this medium
//! only ever carries the fixed 1.44 MB geometry, but the parser reads
//! whatever the sector actually says.

use generic_array::GenericArray;
use typenum::consts::U512;

use core::convert::TryInto;

/// Canonical values for a 1.44 MB (3.5", HD) floppy.
pub mod canonical {
    pub const BYTES_PER_SECTOR: u16 = 512;
    pub const SECTORS_PER_CLUSTER: u8 = 1;
    pub const RESERVED_SECTORS: u16 = 1;
    pub const NUM_FATS: u8 = 2;
    pub const ROOT_ENTRIES: u16 = 224;
    pub const TOTAL_SECTORS: u16 = 2880;
    pub const MEDIA_DESCRIPTOR: u8 = 0xF0;
    pub const SECTORS_PER_FAT: u16 = 9;
    pub const SECTORS_PER_TRACK: u16 = 18;
    pub const NUM_HEADS: u16 = 2;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    /// Offset 0x003: OEM name, 8 bytes.
    pub oem_name: [u8; 8],
    pub bpb: BiosParameterBlock,
    /// Offset 0x026: extended boot signature, 0x29 if volume_id/label below
    /// are present.
    pub extended_boot_signature: u8,
    /// Offset 0x027.
    pub volume_id: u32,
    /// Offset 0x02B, blank-padded.
    pub volume_label: [u8; 11],
    /// Offset 0x036, e.g. `"FAT12   "`.
    pub file_system_type: [u8; 8],
}

impl BootSector {
    pub fn new(volume_label: [u8; 11]) -> Self {
        Self {
            oem_name: *b"pico-f12",
            bpb: BiosParameterBlock::default_144mb(),
            extended_boot_signature: 0x29,
            volume_id: 0,
            volume_label,
            file_system_type: *b"FAT12   ",
        }
    }

    pub fn read(sector: &GenericArray<u8, U512>) -> Option<Self> {
        let sector = sector.as_slice();
        if sector[510] != 0x55 || sector[511] != 0xAA {
            return None;
        }

        Some(Self {
            oem_name: sector[3..11].try_into().unwrap(),
            bpb: BiosParameterBlock::read(sector),
            extended_boot_signature: sector[0x026],
            volume_id: u32::from_le_bytes(sector[0x027..0x02B].try_into().unwrap()),
            volume_label: sector[0x02B..0x036].try_into().unwrap(),
            file_system_type: sector[0x036..0x03E].try_into().unwrap(),
        })
    }

    pub fn write(&self, sector: &mut GenericArray<u8, U512>) {
        let buf = sector.as_mut_slice();
        buf.iter_mut().for_each(|b| *b = 0);

        buf[0] = 0xEB;
        buf[1] = 0x3C;
        buf[2] = 0x90;
        buf[3..11].copy_from_slice(&self.oem_name);

        self.bpb.write(buf);

        buf[0x024] = 0x00; // physical drive number
        buf[0x025] = 0x00; // reserved
        buf[0x026] = self.extended_boot_signature;
        buf[0x027..0x02B].copy_from_slice(&self.volume_id.to_le_bytes());
        buf[0x02B..0x036].copy_from_slice(&self.volume_label);
        buf[0x036..0x03E].copy_from_slice(&self.file_system_type);

        buf[510] = 0x55;
        buf[511] = 0xAA;
    }

    /// First FAT sector, directly after the reserved area.
    pub fn fat_start_sector(&self) -> u16 {
        self.bpb.reserved_sectors
    }

    /// First root-directory sector, after both FAT copies.
    pub fn root_dir_start_sector(&self) -> u16 {
        self.fat_start_sector() + self.bpb.num_fats as u16 * self.bpb.sectors_per_fat
    }

    /// Sectors occupied by the root directory (32 bytes/entry, rounded up).
    pub fn root_dir_sectors(&self) -> u16 {
        let bytes = self.bpb.root_entries as u32 * 32;
        let per_sector = self.bpb.bytes_per_sector as u32;
        ((bytes + per_sector - 1) / per_sector) as u16
    }

    /// First data-area sector (cluster 2).
    pub fn data_start_sector(&self) -> u16 {
        self.root_dir_start_sector() + self.root_dir_sectors()
    }

    /// Total usable data clusters, the quantity that decides FAT12-ness.
    pub fn total_clusters(&self) -> u16 {
        let data_sectors = self.bpb.total_sectors.saturating_sub(self.data_start_sector());
        data_sectors / self.bpb.sectors_per_cluster as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiosParameterBlock {
    /// Offset 0x00B.
    pub bytes_per_sector: u16,
    /// Offset 0x00D.
    pub sectors_per_cluster: u8,
    /// Offset 0x00E.
    pub reserved_sectors: u16,
    /// Offset 0x010.
    pub num_fats: u8,
    /// Offset 0x011.
    pub root_entries: u16,
    /// Offset 0x013.
    pub total_sectors: u16,
    /// Offset 0x015.
    pub media_descriptor: u8,
    /// Offset 0x016.
    pub sectors_per_fat: u16,
    /// Offset 0x018.
    pub sectors_per_track: u16,
    /// Offset 0x01A.
    pub num_heads: u16,
    /// Offset 0x01C.
    pub hidden_sectors: u32,
    /// Offset 0x020: total sectors if it doesn't fit in the 16-bit field.
    pub total_sectors_large: u32,
}

impl BiosParameterBlock {
    pub fn default_144mb() -> Self {
        use canonical::*;
        Self {
            bytes_per_sector: BYTES_PER_SECTOR,
            sectors_per_cluster: SECTORS_PER_CLUSTER,
            reserved_sectors: RESERVED_SECTORS,
            num_fats: NUM_FATS,
            root_entries: ROOT_ENTRIES,
            total_sectors: TOTAL_SECTORS,
            media_descriptor: MEDIA_DESCRIPTOR,
            sectors_per_fat: SECTORS_PER_FAT,
            sectors_per_track: SECTORS_PER_TRACK,
            num_heads: NUM_HEADS,
            hidden_sectors: 0,
            total_sectors_large: 0,
        }
    }

    pub fn read(sector: &[u8]) -> Self {
        macro_rules! e {
            ($ty:tt, $offset:literal) => {
                $ty::from_le_bytes(
                    sector[$offset..($offset + core::mem::size_of::<$ty>())]
                        .try_into()
                        .unwrap(),
                )
            };
        }

        Self {
            bytes_per_sector: e!(u16, 0x00B),
            sectors_per_cluster: e!(u8, 0x00D),
            reserved_sectors: e!(u16, 0x00E),
            num_fats: e!(u8, 0x010),
            root_entries: e!(u16, 0x011),
            total_sectors: e!(u16, 0x013),
            media_descriptor: e!(u8, 0x015),
            sectors_per_fat: e!(u16, 0x016),
            sectors_per_track: e!(u16, 0x018),
            num_heads: e!(u16, 0x01A),
            hidden_sectors: e!(u32, 0x01C),
            total_sectors_large: e!(u32, 0x020),
        }
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[0x00B..0x00D].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        buf[0x00D] = self.sectors_per_cluster;
        buf[0x00E..0x010].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        buf[0x010] = self.num_fats;
        buf[0x011..0x013].copy_from_slice(&self.root_entries.to_le_bytes());
        buf[0x013..0x015].copy_from_slice(&self.total_sectors.to_le_bytes());
        buf[0x015] = self.media_descriptor;
        buf[0x016..0x018].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
        buf[0x018..0x01A].copy_from_slice(&self.sectors_per_track.to_le_bytes());
        buf[0x01A..0x01C].copy_from_slice(&self.num_heads.to_le_bytes());
        buf[0x01C..0x020].copy_from_slice(&self.hidden_sectors.to_le_bytes());
        buf[0x020..0x024].copy_from_slice(&self.total_sectors_large.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_canonical_144mb_geometry() {
        let boot = BootSector::new(*b"NO NAME    ");
        assert_eq!(boot.fat_start_sector(), 1);
        assert_eq!(boot.root_dir_start_sector(), 1 + 2 * 9);
        assert_eq!(boot.root_dir_sectors(), 14);
        assert_eq!(boot.data_start_sector(), 19 + 14);
        assert_eq!(boot.total_clusters(), (2880 - 33) / 1);
    }

    #[test]
    fn round_trips_through_a_sector() {
        let boot = BootSector::new(*b"TESTDISK   ");
        let mut sector: GenericArray<u8, U512> = GenericArray::default();
        boot.write(&mut sector);
        let parsed = BootSector::read(&sector).unwrap();
        assert_eq!(parsed, boot);
    }

    #[test]
    fn rejects_missing_boot_signature() {
        let sector: GenericArray<u8, U512> = GenericArray::default();
        assert!(BootSector::read(&sector).is_none());
    }
}
