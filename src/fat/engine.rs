//! The FAT12 engine: mount, on-disk layout, cluster allocation, and full
//! vs. quick format. Keeps both FAT copies and the whole root directory
//! resident in RAM — at 4.5 KiB and 7 KiB respectively on this medium,
//! that's cheaper than re-reading them a sector at a time.

use super::boot_sector::BootSector;
use super::table::{self, FIRST_DATA_CLUSTER};
use super::types::{Cluster, Lba};
use crate::error::{Error, Result};
use crate::media::{MediaIo, Track};
use crate::{HEADS, SECTORS_PER_TRACK};

pub const FAT_BYTES: usize = 9 * 512;
pub const ROOT_DIR_BYTES: usize = 14 * 512;

pub struct Fat12<M: MediaIo> {
    pub boot: BootSector,
    fat: [u8; FAT_BYTES],
    root_dir: [u8; ROOT_DIR_BYTES],
    next_free_hint: u16,
    _media: core::marker::PhantomData<M>,
}

impl<M: MediaIo> Fat12<M> {
    /// Reads the boot sector, then both FAT copies and the whole root
    /// directory into RAM.
    pub fn mount(media: &mut M) -> Result<Self> {
        let sector = read_sector(media, Lba::new(0))?;
        let boot = BootSector::read(&sector).ok_or(Error::NotFound)?;
        if boot.bpb.bytes_per_sector != 512 {
            return Err(Error::Invalid);
        }

        let mut fs = Self {
            boot,
            fat: [0; FAT_BYTES],
            root_dir: [0; ROOT_DIR_BYTES],
            next_free_hint: FIRST_DATA_CLUSTER,
            _media: core::marker::PhantomData,
        };

        fs.reload_fat(media)?;
        fs.reload_root_dir(media)?;
        Ok(fs)
    }

    fn reload_fat(&mut self, media: &mut M) -> Result<()> {
        let start = self.boot.fat_start_sector();
        let sectors = self.boot.bpb.sectors_per_fat;
        for i in 0..sectors {
            let lba = Lba::new(start + i);
            let sector = read_sector(media, lba)?;
            let offset = i as usize * 512;
            self.fat[offset..offset + 512].copy_from_slice(sector.as_slice());
        }
        Ok(())
    }

    fn reload_root_dir(&mut self, media: &mut M) -> Result<()> {
        let start = self.boot.root_dir_start_sector();
        let sectors = self.boot.root_dir_sectors();
        for i in 0..sectors {
            let lba = Lba::new(start + i);
            let sector = read_sector(media, lba)?;
            let offset = i as usize * 512;
            self.root_dir[offset..offset + 512].copy_from_slice(sector.as_slice());
        }
        Ok(())
    }

    pub fn root_dir(&self) -> &[u8] {
        let bytes = self.boot.root_dir_sectors() as usize * 512;
        &self.root_dir[..bytes]
    }

    pub fn root_dir_mut(&mut self) -> &mut [u8] {
        let bytes = self.boot.root_dir_sectors() as usize * 512;
        &mut self.root_dir[..bytes]
    }

    /// Flushes the in-RAM root directory back out, sector by sector,
    /// mirrored to neither FAT copy (the root directory isn't mirrored).
    pub fn flush_root_dir(&mut self, media: &mut M) -> Result<()> {
        let start = self.boot.root_dir_start_sector();
        let sectors = self.boot.root_dir_sectors();
        for i in 0..sectors {
            let offset = i as usize * 512;
            write_sector(media, Lba::new(start + i), &self.root_dir[offset..offset + 512])?;
        }
        Ok(())
    }

    pub fn fat_entry(&self, cluster: Cluster) -> Cluster {
        table::read_entry(&self.fat, *cluster)
    }

    pub fn set_fat_entry(&mut self, cluster: Cluster, value: Cluster) {
        table::write_entry(&mut self.fat, *cluster, value);
    }

    pub fn cluster_chain(&self, start: Cluster) -> table::ClusterChain<'_> {
        table::ClusterChain::new(&self.fat, start, self.boot.total_clusters())
    }

    /// Allocates one free cluster, marks it end-of-chain, and advances the
    /// allocation hint past it.
    pub fn allocate_cluster(&mut self) -> Result<Cluster> {
        let total = self.boot.total_clusters();
        let cluster = table::next_free_cluster(&self.fat, total, self.next_free_hint)
            .ok_or(Error::Full)?;
        self.set_fat_entry(cluster, Cluster::EOC_MIN);
        self.next_free_hint = (*cluster + 1).min(total + FIRST_DATA_CLUSTER - 1);
        Ok(cluster)
    }

    /// Appends a freshly allocated cluster to the end of `tail`'s chain.
    pub fn grow_chain(&mut self, tail: Cluster) -> Result<Cluster> {
        let next = self.allocate_cluster()?;
        self.set_fat_entry(tail, next);
        Ok(next)
    }

    /// Frees every cluster in a chain.
    pub fn free_chain(&mut self, start: Cluster) {
        let clusters: heapless_chain::ChainBuf = self.cluster_chain(start).collect();
        for cluster in clusters.iter() {
            self.set_fat_entry(*cluster, Cluster::FREE);
        }
        if *start < self.next_free_hint {
            self.next_free_hint = *start;
        }
    }

    /// Writes both mirrored FAT copies out, a sector at a time.
    pub fn flush_fat(&mut self, media: &mut M) -> Result<()> {
        let start = self.boot.fat_start_sector();
        let sectors = self.boot.bpb.sectors_per_fat;
        for copy in 0..self.boot.bpb.num_fats as u16 {
            for i in 0..sectors {
                let offset = i as usize * 512;
                let lba = Lba::new(start + copy * sectors + i);
                write_sector(media, lba, &self.fat[offset..offset + 512])?;
            }
        }
        Ok(())
    }

    pub fn cluster_to_lba(&self, cluster: Cluster) -> Lba {
        let data_start = self.boot.data_start_sector();
        let spc = self.boot.bpb.sectors_per_cluster as u16;
        Lba::new(data_start + (*cluster - FIRST_DATA_CLUSTER) * spc)
    }

    /// Formats the medium. `quick` stops zeroing data sectors once the
    /// current track's last sector is past the start of the data area —
    /// the boot sector, both FATs, and the root directory are always
    /// rewritten in full either way.
    pub fn format(media: &mut M, volume_label: [u8; 11], quick: bool) -> Result<Self> {
        let boot = BootSector::new(volume_label);
        let mut fat = [0u8; FAT_BYTES];
        fat[0] = boot.bpb.media_descriptor;
        fat[1] = 0xFF;
        fat[2] = 0xFF;

        let mut fs = Self {
            boot,
            fat,
            root_dir: [0u8; ROOT_DIR_BYTES],
            next_free_hint: FIRST_DATA_CLUSTER,
            _media: core::marker::PhantomData,
        };

        let mut boot_sector = crate::media::SectorData::default();
        fs.boot.write(&mut boot_sector);
        write_sector(media, Lba::new(0), boot_sector.as_slice())?;

        fs.flush_fat(media)?;
        fs.flush_root_dir(media)?;

        if !quick {
            let data_start = fs.boot.data_start_sector();
            for cylinder in 0..crate::CYLINDERS as u8 {
                for head in 0..HEADS as u8 {
                    let track_end_lba =
                        Lba::from_chs(
                            super::types::Cylinder::new(cylinder),
                            super::types::Head::new(head),
                            super::types::SectorNumber::new(SECTORS_PER_TRACK as u8),
                            HEADS as u8,
                            SECTORS_PER_TRACK as u8,
                        );
                    if track_end_lba.idx() < data_start as usize {
                        continue;
                    }
                    let mut track = Track::blank(cylinder, head);
                    for sector in track.sectors.iter_mut() {
                        sector.valid = true;
                    }
                    if !media.write(&mut track) {
                        return Err(Error::Io);
                    }
                }
            }
        }

        Ok(fs)
    }
}

fn read_sector<M: MediaIo>(media: &mut M, lba: Lba) -> Result<crate::media::SectorData> {
    let (cylinder, head, sector_n) = lba.to_chs(HEADS as u8, SECTORS_PER_TRACK as u8);
    let mut sector = crate::media::Sector::blank(*cylinder, *head, *sector_n);
    if !media.read(&mut sector) {
        return Err(Error::Io);
    }
    Ok(sector.data)
}

fn write_sector<M: MediaIo>(media: &mut M, lba: Lba, data: &[u8]) -> Result<()> {
    let (cylinder, head, sector_n) = lba.to_chs(HEADS as u8, SECTORS_PER_TRACK as u8);
    let mut track = Track::blank(*cylinder, *head);
    let idx = (*sector_n - 1) as usize;
    track.sectors[idx].data.as_mut_slice().copy_from_slice(data);
    track.sectors[idx].valid = true;
    if media.write(&mut track) {
        Ok(())
    } else {
        Err(Error::Io)
    }
}

/// A small fixed-capacity buffer for cluster chains collected during
/// deallocation, since this engine never allocates on the heap.
mod heapless_chain {
    use super::Cluster;
    use core::iter::FromIterator;

    pub struct ChainBuf {
        buf: [Cluster; 2880],
        len: usize,
    }

    impl ChainBuf {
        pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
            self.buf[..self.len].iter()
        }
    }

    impl FromIterator<Cluster> for ChainBuf {
        fn from_iter<I: IntoIterator<Item = Cluster>>(iter: I) -> Self {
            let mut buf = [Cluster::new(0); 2880];
            let mut len = 0;
            for c in iter {
                if len < buf.len() {
                    buf[len] = c;
                    len += 1;
                }
            }
            Self { buf, len }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Sector;
    use std::collections::HashMap;

    struct RamMedia {
        tracks: HashMap<(u8, u8), Track>,
        writable: bool,
    }

    impl RamMedia {
        fn new() -> Self {
            Self {
                tracks: HashMap::new(),
                writable: true,
            }
        }
    }

    impl MediaIo for RamMedia {
        fn read(&mut self, sector: &mut Sector) -> bool {
            match self.tracks.get(&(sector.cylinder, sector.head)) {
                Some(track) => {
                    let idx = (sector.sector_n - 1) as usize;
                    if track.sectors[idx].valid {
                        sector.data = track.sectors[idx].data.clone();
                        sector.valid = true;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        }
        fn write(&mut self, track: &mut Track) -> bool {
            if !self.writable {
                return false;
            }
            self.tracks.insert((track.cylinder, track.head), track.clone());
            true
        }
        fn disk_changed(&mut self) -> bool {
            false
        }
        fn write_protected(&mut self) -> bool {
            !self.writable
        }
    }

    #[test]
    fn quick_format_then_mount_round_trips_layout() {
        let mut media = RamMedia::new();
        let formatted = Fat12::format(&mut media, *b"NO NAME    ", true).unwrap();
        let mounted = Fat12::mount(&mut media).unwrap();
        assert_eq!(mounted.boot.data_start_sector(), formatted.boot.data_start_sector());
        assert_eq!(mounted.root_dir(), formatted.root_dir());
    }

    #[test]
    fn cluster_allocation_avoids_reserved_entries() {
        let mut media = RamMedia::new();
        let mut fs = Fat12::format(&mut media, *b"NO NAME    ", true).unwrap();
        let first = fs.allocate_cluster().unwrap();
        assert!(*first >= FIRST_DATA_CLUSTER);
        let second = fs.allocate_cluster().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn freeing_a_chain_returns_clusters_to_the_pool() {
        let mut media = RamMedia::new();
        let mut fs = Fat12::format(&mut media, *b"NO NAME    ", true).unwrap();
        let a = fs.allocate_cluster().unwrap();
        let b = fs.grow_chain(a).unwrap();
        fs.free_chain(a);
        assert!(fs.fat_entry(a).is_free());
        assert!(fs.fat_entry(b).is_free());
    }
}
