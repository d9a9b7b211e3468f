//! Directory entries: the on-disk 32-byte record format (shared with
//! FAT16/32), 8.3 name formatting, and root-directory scanning.
//!
//! This engine only ever has one directory — the fixed-size root area —
//! so there's no cluster-chained directory traversal here, just a flat
//! scan over a byte slice.

use super::types::Cluster;

use core::convert::TryInto;
use core::fmt::{self, Debug};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    ReadOnly = 0x01,
    Hidden = 0x02,
    System = 0x04,
    VolumeId = 0x08,
    Directory = 0x10,
    Archive = 0x20,
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeSet {
    inner: u8,
}

impl AttributeSet {
    pub fn is_dir(&self) -> bool {
        (self.inner & (Attribute::Directory as u8)) != 0
    }

    pub fn is_volume_id(&self) -> bool {
        (self.inner & (Attribute::VolumeId as u8)) != 0
    }

    pub fn set(&mut self, attr: Attribute) {
        self.inner |= attr as u8;
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct FileName(pub [u8; 8]);

impl Debug for FileName {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0.iter() {
            if b == 0x20 || b == 0x00 {
                break;
            }
            write!(fmt, "{}", b as char)?;
        }
        Ok(())
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct FileExt(pub [u8; 3]);

impl Debug for FileExt {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0.iter() {
            if b == 0x20 || b == 0x00 {
                break;
            }
            write!(fmt, "{}", b as char)?;
        }
        Ok(())
    }
}

/// Splits `name` on its last `.` and produces a space-padded, uppercased
/// 8.3 pair. Non-ASCII bytes and anything past the 8/3 budget are dropped,
/// matching a lossy DOS-name conversion rather than rejecting the input.
pub fn format_8_3(name: &str) -> (FileName, FileExt) {
    let (stem, ext) = match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, ""),
    };

    let mut file_name = [0x20u8; 8];
    let mut file_ext = [0x20u8; 3];

    let mut i = 0;
    for c in stem.chars() {
        if i >= 8 || !c.is_ascii() || c == ' ' {
            continue;
        }
        file_name[i] = c.to_ascii_uppercase() as u8;
        i += 1;
    }

    let mut j = 0;
    for c in ext.chars() {
        if j >= 3 || !c.is_ascii() || c == ' ' {
            continue;
        }
        file_ext[j] = c.to_ascii_uppercase() as u8;
        j += 1;
    }

    (FileName(file_name), FileExt(file_ext))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Exists,
    Deleted,
    End,
}

pub const DELETED_MARKER: u8 = 0xE5;
pub const END_MARKER: u8 = 0x00;

pub const ENTRY_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct DirEntry {
    pub file_name: FileName,
    pub file_ext: FileExt,
    pub attributes: AttributeSet,
    pub creation_time: u16,
    pub creation_date: u16,
    pub last_access_date: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub first_cluster: u16,
    pub file_size: u32,
}

impl DirEntry {
    pub fn state(&self) -> EntryState {
        match self.file_name.0[0] {
            END_MARKER => EntryState::End,
            DELETED_MARKER => EntryState::Deleted,
            _ => EntryState::Exists,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn deleted() -> Self {
        let mut d = Self::default();
        d.file_name.0[0] = DELETED_MARKER;
        d
    }

    pub fn new_file(name: FileName, ext: FileExt, first_cluster: Cluster) -> Self {
        let mut d = Self::default();
        d.file_name = name;
        d.file_ext = ext;
        d.attributes.set(Attribute::Archive);
        d.first_cluster = *first_cluster;
        d
    }

    pub fn is_dir(&self) -> bool {
        self.attributes.is_dir()
    }

    pub fn first_cluster(&self) -> Cluster {
        Cluster::new(self.first_cluster)
    }

    pub fn from_arr(arr: &[u8; ENTRY_SIZE]) -> Self {
        macro_rules! e {
            ($ty:tt, $offset:literal) => {
                $ty::from_le_bytes(
                    arr[$offset..($offset + core::mem::size_of::<$ty>())]
                        .try_into()
                        .unwrap(),
                )
            };
        }

        Self {
            file_name: FileName(arr[0..8].try_into().unwrap()),
            file_ext: FileExt(arr[8..11].try_into().unwrap()),
            attributes: AttributeSet { inner: arr[11] },
            creation_time: e!(u16, 14),
            creation_date: e!(u16, 16),
            last_access_date: e!(u16, 18),
            last_modified_time: e!(u16, 22),
            last_modified_date: e!(u16, 24),
            first_cluster: e!(u16, 26),
            file_size: e!(u32, 28),
        }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        Some(Self::from_arr(slice.try_into().ok()?))
    }

    pub fn into_arr(&self) -> [u8; ENTRY_SIZE] {
        let mut arr = [0u8; ENTRY_SIZE];
        arr[0..8].copy_from_slice(&self.file_name.0);
        arr[8..11].copy_from_slice(&self.file_ext.0);
        arr[11] = self.attributes.inner;
        arr[12] = 0;
        arr[13] = 0;
        arr[14..16].copy_from_slice(&self.creation_time.to_le_bytes());
        arr[16..18].copy_from_slice(&self.creation_date.to_le_bytes());
        arr[18..20].copy_from_slice(&self.last_access_date.to_le_bytes());
        arr[20..22].copy_from_slice(&0u16.to_le_bytes()); // cluster_num_upper: always 0 on FAT12
        arr[22..24].copy_from_slice(&self.last_modified_time.to_le_bytes());
        arr[24..26].copy_from_slice(&self.last_modified_date.to_le_bytes());
        arr[26..28].copy_from_slice(&self.first_cluster.to_le_bytes());
        arr[28..32].copy_from_slice(&self.file_size.to_le_bytes());
        arr
    }

    pub fn write_into(&self, slice: &mut [u8]) {
        slice[..ENTRY_SIZE].copy_from_slice(&self.into_arr());
    }
}

/// Scans a root-directory byte region for the first entry whose name/ext
/// match, returning its slot index (in entries, not bytes).
pub fn find(bytes: &[u8], name: FileName, ext: FileExt) -> Option<(usize, DirEntry)> {
    entries(bytes).find(|(_, e)| {
        matches!(e.state(), EntryState::Exists)
            && !e.attributes.is_volume_id()
            && e.file_name == name
            && e.file_ext == ext
    })
}

/// The first free slot: a deleted entry, or the end-of-directory marker.
pub fn find_free_slot(bytes: &[u8]) -> Option<usize> {
    for (idx, chunk) in bytes.chunks_exact(ENTRY_SIZE).enumerate() {
        if chunk[0] == DELETED_MARKER || chunk[0] == END_MARKER {
            return Some(idx);
        }
    }
    None
}

pub fn entries(bytes: &[u8]) -> impl Iterator<Item = (usize, DirEntry)> + '_ {
    bytes
        .chunks_exact(ENTRY_SIZE)
        .enumerate()
        .take_while(|(_, chunk)| chunk[0] != END_MARKER)
        .filter_map(|(idx, chunk)| DirEntry::from_slice(chunk).map(|e| (idx, e)))
}

/// Total directory slots available, independent of how many are currently
/// occupied (used to bound a full scan when inserting past the last
/// occupied entry).
pub fn slot_count(bytes: &[u8]) -> usize {
    bytes.len() / ENTRY_SIZE
}
