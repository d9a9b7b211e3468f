//! The POSIX-shaped file API: mount/format, a fixed-capacity open-file
//! table, and the per-operation mount/write-protect/disk-changed checks
//! every entry point runs before touching the FAT engine.

use crate::cache::{cache_key, SectorCache};
use crate::error::{Error, Result};
use crate::fat::batch::WriteBatch;
use crate::fat::dir::{self, format_8_3, DirEntry, FileExt, FileName};
use crate::fat::engine::Fat12;
use crate::fat::types::Cluster;
use crate::media::MediaIo;
use crate::{HEADS, SECTORS_PER_TRACK};

pub const MAX_OPEN_FILES: usize = 10;
pub const DEFAULT_CACHE_SECTORS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub size: u32,
    pub is_dir: bool,
    pub first_cluster: u16,
}

struct ReaderState {
    dirent: DirEntry,
    cursor_cluster: Option<Cluster>,
    bytes_read: u32,
}

struct WriterState {
    dirent_index: usize,
    dirent: DirEntry,
    first_cluster: Option<Cluster>,
    current_cluster: Option<Cluster>,
    cluster_offset: u32,
    bytes_written: u32,
}

enum OpenFile {
    Read(ReaderState),
    Write(WriterState),
}

/// Owns the BPB (via [`Fat12`]), the sector cache, the write batch, the
/// open-file table, and the last-error field. `CACHE` sizes the sector
/// cache's backing store.
pub struct Filesystem<M: MediaIo, const CACHE: usize = DEFAULT_CACHE_SECTORS> {
    media: M,
    fat: Option<Fat12<M>>,
    cache: SectorCache<CACHE>,
    batch: WriteBatch,
    open: [Option<OpenFile>; MAX_OPEN_FILES],
    mounted: bool,
    writer_open: bool,
    last_error: Option<Error>,
}

impl<M: MediaIo, const CACHE: usize> Filesystem<M, CACHE> {
    pub fn new(media: M) -> Self {
        Self {
            media,
            fat: None,
            cache: SectorCache::new(),
            batch: WriteBatch::new(),
            open: core::array::from_fn(|_| None),
            mounted: false,
            writer_open: false,
            last_error: None,
        }
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    fn fail(&mut self, err: Error) -> Error {
        self.last_error = Some(err);
        err
    }

    /// Every entry point starts here: checks the mount flag first, then
    /// disk-changed (tearing down the mount and cache on detection), then
    /// write-protect for write-flavored operations.
    fn check_ready(&mut self, for_write: bool) -> Result<()> {
        if !self.mounted || self.fat.is_none() {
            return Err(self.fail(Error::NotMounted));
        }
        if self.media.disk_changed() {
            log::warn!("disk change detected, invalidating mount");
            self.mounted = false;
            self.fat = None;
            self.cache.clear();
            self.open = core::array::from_fn(|_| None);
            self.writer_open = false;
            return Err(self.fail(Error::DiskChanged));
        }
        if for_write && self.media.write_protected() {
            return Err(self.fail(Error::WriteProtected));
        }
        Ok(())
    }

    pub fn mount(&mut self) -> Result<()> {
        let fat = Fat12::mount(&mut self.media).map_err(|e| self.fail(e))?;
        self.fat = Some(fat);
        self.cache.clear();
        self.mounted = true;
        log::debug!("mounted");
        Ok(())
    }

    /// Mount-aware: unmounts, formats, re-mounts.
    pub fn format(&mut self, label: &str, full: bool) -> Result<()> {
        self.mounted = false;
        self.fat = None;
        self.cache.clear();
        if self.media.write_protected() {
            return Err(self.fail(Error::WriteProtected));
        }

        let (name, ext) = format_8_3(label);
        let mut volume_label = [0x20u8; 11];
        volume_label[..8].copy_from_slice(&name.0);
        volume_label[8..].copy_from_slice(&ext.0);

        let fat = Fat12::format(&mut self.media, volume_label, !full).map_err(|e| self.fail(e))?;
        self.fat = Some(fat);
        self.mounted = true;
        log::debug!("formatted ({})", if full { "full" } else { "quick" });
        Ok(())
    }

    fn fat(&mut self) -> &mut Fat12<M> {
        self.fat.as_mut().expect("checked by check_ready")
    }

    fn free_slot(&self) -> Option<usize> {
        self.open.iter().position(Option::is_none)
    }

    fn split_path(path: &str) -> &str {
        path.strip_prefix('/').unwrap_or(path)
    }

    fn lookup(&self, name: FileName, ext: FileExt) -> Option<(usize, DirEntry)> {
        dir::find(self.fat.as_ref().unwrap().root_dir(), name, ext)
    }

    /// Strips the leading `/`, checks mode-appropriate access, finds or
    /// creates the directory entry, and initializes the reader/writer
    /// state. Opening for write truncates any existing content.
    pub fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle> {
        self.check_ready(mode == OpenMode::Write)?;
        if mode == OpenMode::Write && self.writer_open {
            return Err(self.fail(Error::TooManyOpen));
        }

        let slot = self.free_slot().ok_or_else(|| self.fail(Error::TooManyOpen))?;
        let name = Self::split_path(path);
        let (file_name, file_ext) = format_8_3(name);

        let found = self.lookup(file_name, file_ext);

        let open_file = match mode {
            OpenMode::Read => {
                let (_, dirent) = found.ok_or_else(|| self.fail(Error::NotFound))?;
                if dirent.is_dir() {
                    return Err(self.fail(Error::IsDirectory));
                }
                OpenFile::Read(ReaderState {
                    dirent,
                    cursor_cluster: Some(dirent.first_cluster()).filter(|c| !c.is_free()),
                    bytes_read: 0,
                })
            }
            OpenMode::Write => {
                let (dirent_index, mut dirent) = match found {
                    Some((idx, existing)) => {
                        if existing.is_dir() {
                            return Err(self.fail(Error::IsDirectory));
                        }
                        if !existing.first_cluster().is_free() {
                            self.fat().free_chain(existing.first_cluster());
                        }
                        (idx, existing)
                    }
                    None => {
                        let free_slot = dir::find_free_slot(self.fat.as_ref().unwrap().root_dir());
                        let idx = free_slot.ok_or_else(|| self.fail(Error::Full))?;
                        (idx, DirEntry::new_file(file_name, file_ext, Cluster::FREE))
                    }
                };
                dirent.first_cluster = 0;
                dirent.file_size = 0;
                dirent.write_into(&mut self.fat().root_dir_mut()[dirent_index * dir::ENTRY_SIZE..]);
                self.writer_open = true;

                OpenFile::Write(WriterState {
                    dirent_index,
                    dirent,
                    first_cluster: None,
                    current_cluster: None,
                    cluster_offset: 0,
                    bytes_written: 0,
                })
            }
        };

        self.open[slot] = Some(open_file);
        Ok(FileHandle(slot))
    }

    fn sectors_per_cluster(&self) -> u32 {
        self.fat.as_ref().unwrap().boot.bpb.sectors_per_cluster as u32
    }

    fn read_cluster_sector(&mut self, cluster: Cluster, sector_in_cluster: u32, buf: &mut [u8]) -> Result<()> {
        let lba = self.fat().cluster_to_lba(cluster);
        let lba = crate::fat::types::Lba::new(*lba + sector_in_cluster as u16);
        let (cyl, head, sector_n) = lba.to_chs(HEADS as u8, SECTORS_PER_TRACK as u8);

        let key = cache_key(*cyl, *head, *sector_n);
        if let Some(staged) = self.batch.peek(*cyl, *head, *sector_n) {
            buf.copy_from_slice(staged.as_slice());
            return Ok(());
        }
        if let Some(sector) = self.cache.get(key) {
            buf.copy_from_slice(sector.data.as_slice());
            return Ok(());
        }

        let sector = self
            .cache
            .read_through(&mut self.media, *cyl, *head, *sector_n)
            .ok_or_else(|| Error::Io)?;
        buf.copy_from_slice(sector.data.as_slice());
        Ok(())
    }

    fn write_cluster_sector(&mut self, cluster: Cluster, sector_in_cluster: u32, data: &[u8]) -> Result<()> {
        let lba = self.fat().cluster_to_lba(cluster);
        let lba = crate::fat::types::Lba::new(*lba + sector_in_cluster as u16);
        let (cyl, head, sector_n) = lba.to_chs(HEADS as u8, SECTORS_PER_TRACK as u8);

        let mut sector_data = crate::media::SectorData::default();
        sector_data.as_mut_slice().copy_from_slice(data);

        let key = cache_key(*cyl, *head, *sector_n);
        let mut sector = crate::media::Sector::blank(*cyl, *head, *sector_n);
        sector.data = sector_data.clone();
        sector.valid = true;
        self.cache.set(key, sector);

        if !self.batch.stage(*cyl, *head, *sector_n, sector_data.clone()) {
            log::debug!("write batch full, flushing early");
            self.flush_batch()?;
            self.batch.stage(*cyl, *head, *sector_n, sector_data);
        }
        Ok(())
    }

    fn flush_batch(&mut self) -> Result<()> {
        if self.batch.flush_all(&mut self.media) {
            Ok(())
        } else {
            Err(Error::Io)
        }
    }

    /// Delegates to the FAT read path, advancing the file cursor.
    pub fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> Result<usize> {
        self.check_ready(false)?;
        let spc = self.sectors_per_cluster();
        let total_size = match self.open.get(handle.0) {
            Some(Some(OpenFile::Read(r))) => r.dirent.file_size,
            _ => return Err(self.fail(Error::BadHandle)),
        };

        let mut written = 0usize;
        while written < buf.len() {
            let (cursor_cluster, bytes_read) = match &self.open[handle.0] {
                Some(OpenFile::Read(r)) => (r.cursor_cluster, r.bytes_read),
                _ => unreachable!(),
            };

            if bytes_read >= total_size {
                break;
            }
            let cluster = match cursor_cluster {
                Some(c) => c,
                None => break,
            };

            let bytes_per_cluster = 512 * spc;
            let offset_in_cluster = bytes_read % bytes_per_cluster;
            let sector_in_cluster = offset_in_cluster / 512;
            let offset_in_sector = (offset_in_cluster % 512) as usize;

            let mut sector_buf = [0u8; 512];
            self.read_cluster_sector(cluster, sector_in_cluster, &mut sector_buf)?;

            let remaining_in_file = (total_size - bytes_read) as usize;
            let remaining_in_sector = 512 - offset_in_sector;
            let take = (buf.len() - written)
                .min(remaining_in_sector)
                .min(remaining_in_file);
            buf[written..written + take]
                .copy_from_slice(&sector_buf[offset_in_sector..offset_in_sector + take]);
            written += take;

            let new_bytes_read = bytes_read + take as u32;
            let crossed_cluster = new_bytes_read % bytes_per_cluster == 0 && new_bytes_read != bytes_read;
            let next_cluster = if crossed_cluster {
                let next = self.fat().fat_entry(cluster);
                if next.is_eoc() || next.is_free() || next.is_bad() {
                    None
                } else {
                    Some(next)
                }
            } else {
                Some(cluster)
            };

            if let Some(OpenFile::Read(r)) = &mut self.open[handle.0] {
                r.bytes_read = new_bytes_read;
                r.cursor_cluster = next_cluster;
            }
        }
        Ok(written)
    }

    /// Delegates to the FAT write path, allocating clusters on demand.
    pub fn write(&mut self, handle: FileHandle, buf: &[u8]) -> Result<usize> {
        self.check_ready(true)?;
        let spc = self.sectors_per_cluster();

        match self.open.get(handle.0) {
            Some(Some(OpenFile::Write(_))) => {}
            Some(Some(OpenFile::Read(_))) => return Err(self.fail(Error::Invalid)),
            _ => return Err(self.fail(Error::BadHandle)),
        }

        let mut written = 0usize;
        while written < buf.len() {
            let (current_cluster, cluster_offset) = match &self.open[handle.0] {
                Some(OpenFile::Write(w)) => (w.current_cluster, w.cluster_offset),
                _ => unreachable!(),
            };

            let bytes_per_cluster = 512 * spc;
            let cluster = match current_cluster {
                Some(c) if cluster_offset < bytes_per_cluster => c,
                Some(c) => {
                    let next = self.fat().grow_chain(c)?;
                    if let Some(OpenFile::Write(w)) = &mut self.open[handle.0] {
                        w.current_cluster = Some(next);
                        w.cluster_offset = 0;
                    }
                    next
                }
                None => {
                    let first = self.fat().allocate_cluster()?;
                    if let Some(OpenFile::Write(w)) = &mut self.open[handle.0] {
                        w.first_cluster = Some(first);
                        w.current_cluster = Some(first);
                        w.cluster_offset = 0;
                    }
                    first
                }
            };

            let offset_in_cluster = match &self.open[handle.0] {
                Some(OpenFile::Write(w)) => w.cluster_offset,
                _ => unreachable!(),
            };
            let sector_in_cluster = offset_in_cluster / 512;
            let offset_in_sector = (offset_in_cluster % 512) as usize;

            let mut sector_buf = [0u8; 512];
            if offset_in_sector != 0 {
                let _ = self.read_cluster_sector(cluster, sector_in_cluster, &mut sector_buf);
            }

            let take = (buf.len() - written).min(512 - offset_in_sector);
            sector_buf[offset_in_sector..offset_in_sector + take]
                .copy_from_slice(&buf[written..written + take]);
            self.write_cluster_sector(cluster, sector_in_cluster, &sector_buf)?;

            written += take;
            if let Some(OpenFile::Write(w)) = &mut self.open[handle.0] {
                w.cluster_offset += take as u32;
                w.bytes_written += take as u32;
                w.dirent.file_size = w.bytes_written;
            }
        }
        Ok(written)
    }

    /// Read-only: reopens the chain from the start and skips `off` bytes,
    /// since the FAT chain is singly-linked.
    pub fn seek(&mut self, handle: FileHandle, off: u32) -> Result<()> {
        self.check_ready(false)?;
        let dirent = match &self.open[handle.0] {
            Some(OpenFile::Read(r)) => r.dirent,
            Some(OpenFile::Write(_)) => return Err(self.fail(Error::Invalid)),
            None => return Err(self.fail(Error::BadHandle)),
        };

        let spc = self.sectors_per_cluster();
        let bytes_per_cluster = 512 * spc;
        let clusters_to_skip = (off / bytes_per_cluster) as u16;

        let mut cluster = if dirent.first_cluster().is_free() {
            None
        } else {
            Some(dirent.first_cluster())
        };
        for _ in 0..clusters_to_skip {
            cluster = match cluster {
                Some(c) => {
                    let next = self.fat().fat_entry(c);
                    if next.is_eoc() || next.is_free() || next.is_bad() {
                        None
                    } else {
                        Some(next)
                    }
                }
                None => None,
            };
        }

        if let Some(OpenFile::Read(r)) = &mut self.open[handle.0] {
            r.cursor_cluster = cluster;
            r.bytes_read = off.min(dirent.file_size);
        }
        Ok(())
    }

    /// One-shot convenience read: opens, seeks, reads, closes.
    pub fn read_at(&mut self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize> {
        let handle = self.open(path, OpenMode::Read)?;
        let result = self.seek(handle, offset).and_then(|_| self.read(handle, buf));
        let _ = self.close(handle);
        result
    }

    /// After close, all of the file's data and metadata are on-media.
    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        self.check_ready(false)?;
        let taken = match self.open.get_mut(handle.0) {
            Some(slot) => slot.take(),
            None => None,
        };

        match taken {
            Some(OpenFile::Write(w)) => {
                let mut dirent = w.dirent;
                dirent.first_cluster = w.first_cluster.map(|c| *c).unwrap_or(0);
                dirent.file_size = w.bytes_written;
                let idx = w.dirent_index;

                let fat = self.fat.as_mut().expect("checked by check_ready");
                dirent.write_into(&mut fat.root_dir_mut()[idx * dir::ENTRY_SIZE..]);

                self.flush_batch()?;
                let fat = self.fat.as_mut().expect("checked by check_ready");
                fat.flush_fat(&mut self.media)?;
                fat.flush_root_dir(&mut self.media)?;
                self.writer_open = false;
                Ok(())
            }
            Some(OpenFile::Read(_)) => Ok(()),
            None => Err(self.fail(Error::BadHandle)),
        }
    }

    pub fn stat(&mut self, path: &str) -> Result<Stat> {
        self.check_ready(false)?;
        let name = Self::split_path(path);
        let (file_name, file_ext) = format_8_3(name);
        let (_, dirent) = self.lookup(file_name, file_ext).ok_or_else(|| Error::NotFound)?;
        Ok(Stat {
            size: dirent.file_size,
            is_dir: dirent.is_dir(),
            first_cluster: dirent.first_cluster,
        })
    }

    pub fn delete(&mut self, path: &str) -> Result<()> {
        self.check_ready(true)?;
        let name = Self::split_path(path);
        let (file_name, file_ext) = format_8_3(name);
        let (idx, dirent) = self.lookup(file_name, file_ext).ok_or_else(|| self.fail(Error::NotFound))?;

        if !dirent.first_cluster().is_free() {
            self.fat().free_chain(dirent.first_cluster());
        }
        DirEntry::deleted().write_into(&mut self.fat().root_dir_mut()[idx * dir::ENTRY_SIZE..]);

        self.flush_batch()?;
        let fat = self.fat.as_mut().expect("checked by check_ready");
        fat.flush_fat(&mut self.media)?;
        fat.flush_root_dir(&mut self.media)?;
        Ok(())
    }

    pub fn opendir(&mut self, path: &str) -> Result<DirHandle> {
        self.check_ready(false)?;
        if Self::split_path(path) != "" {
            return Err(self.fail(Error::NotFound));
        }
        Ok(DirHandle { index: 0 })
    }

    /// Advances past deleted/volume-label entries; LFN entries don't exist
    /// in this engine's 8.3-only directory format, so nothing to filter
    /// there.
    pub fn readdir(&mut self, dh: &mut DirHandle) -> Result<Option<DirEntry>> {
        self.check_ready(false)?;
        let root = self.fat.as_ref().unwrap().root_dir();
        let total = dir::slot_count(root);

        while dh.index < total {
            let start = dh.index * dir::ENTRY_SIZE;
            let chunk = &root[start..start + dir::ENTRY_SIZE];
            dh.index += 1;

            match chunk[0] {
                dir::END_MARKER => return Ok(None),
                dir::DELETED_MARKER => continue,
                _ => {
                    let entry = DirEntry::from_slice(chunk).unwrap();
                    if entry.attributes.is_volume_id() {
                        continue;
                    }
                    return Ok(Some(entry));
                }
            }
        }
        Ok(None)
    }

    pub fn closedir(&mut self, _dh: DirHandle) {}

    /// Iterates every live directory entry without the handle ceremony.
    pub fn for_each_entry(&mut self, mut f: impl FnMut(&DirEntry)) -> Result<()> {
        let mut dh = self.opendir("/")?;
        while let Some(entry) = self.readdir(&mut dh)? {
            f(&entry);
        }
        Ok(())
    }

    pub fn errno(&self) -> Option<Error> {
        self.last_error
    }

    pub fn strerror(err: Error) -> &'static str {
        err.as_str()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DirHandle {
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Sector, Track};
    use std::collections::HashMap;

    struct RamMedia {
        tracks: HashMap<(u8, u8), Track>,
        writable: bool,
        changed: bool,
    }

    impl RamMedia {
        fn new() -> Self {
            Self {
                tracks: HashMap::new(),
                writable: true,
                changed: false,
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
            let c = self.changed;
            self.changed = false;
            c
        }
        fn write_protected(&mut self) -> bool {
            !self.writable
        }
    }

    fn formatted_fs() -> Filesystem<RamMedia, 8> {
        let mut fs: Filesystem<RamMedia, 8> = Filesystem::new(RamMedia::new());
        fs.format("TEST", true).unwrap();
        fs
    }

    #[test]
    fn write_then_read_back_round_trips() {
        let mut fs = formatted_fs();
        let handle = fs.open("hello.txt", OpenMode::Write).unwrap();
        fs.write(handle, b"hello, floppy").unwrap();
        fs.close(handle).unwrap();

        let handle = fs.open("hello.txt", OpenMode::Read).unwrap();
        let mut buf = [0u8; 13];
        let n = fs.read(handle, &mut buf).unwrap();
        fs.close(handle).unwrap();

        assert_eq!(n, 13);
        assert_eq!(&buf, b"hello, floppy");
    }

    #[test]
    fn stat_reports_size_after_close() {
        let mut fs = formatted_fs();
        let handle = fs.open("a.txt", OpenMode::Write).unwrap();
        fs.write(handle, b"1234567890").unwrap();
        fs.close(handle).unwrap();

        let st = fs.stat("a.txt").unwrap();
        assert_eq!(st.size, 10);
        assert!(!st.is_dir);
    }

    #[test]
    fn delete_frees_the_chain() {
        let mut fs = formatted_fs();
        let handle = fs.open("a.txt", OpenMode::Write).unwrap();
        fs.write(handle, &[0u8; 1200]).unwrap();
        fs.close(handle).unwrap();

        fs.delete("a.txt").unwrap();
        assert_eq!(fs.stat("a.txt"), Err(Error::NotFound));
    }

    #[test]
    fn opening_a_missing_file_for_read_fails() {
        let mut fs = formatted_fs();
        assert_eq!(fs.open("nope.txt", OpenMode::Read), Err(Error::NotFound));
    }

    #[test]
    fn readdir_lists_created_files_and_skips_deleted() {
        let mut fs = formatted_fs();
        for name in ["a.txt", "b.txt"] {
            let handle = fs.open(name, OpenMode::Write).unwrap();
            fs.write(handle, b"x").unwrap();
            fs.close(handle).unwrap();
        }
        fs.delete("a.txt").unwrap();

        let mut names = std::vec::Vec::new();
        fs.for_each_entry(|e| names.push(format!("{:?}", e.file_name))).unwrap();
        assert_eq!(names, vec!["B".to_string()]);
    }

    #[test]
    fn seek_skips_into_a_later_cluster() {
        let mut fs = formatted_fs();
        let handle = fs.open("big.txt", OpenMode::Write).unwrap();
        let data: std::vec::Vec<u8> = (0..1200u32).map(|i| (i % 256) as u8).collect();
        fs.write(handle, &data).unwrap();
        fs.close(handle).unwrap();

        let handle = fs.open("big.txt", OpenMode::Read).unwrap();
        fs.seek(handle, 512).unwrap();
        let mut buf = [0u8; 4];
        fs.read(handle, &mut buf).unwrap();
        fs.close(handle).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
    }

    #[test]
    fn disk_change_invalidates_the_mount() {
        let mut fs = formatted_fs();
        fs.media.changed = true;
        assert_eq!(fs.stat("anything"), Err(Error::DiskChanged));
        assert!(!fs.mounted);
    }
}
