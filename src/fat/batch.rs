//! Pending-write batching: sector writes are staged here and only flushed
//! a whole track at a time, so one file-write call doesn't force a
//! read-modify-write of every sector it touches.

use crate::media::{MediaIo, Track};
use crate::SECTORS_PER_TRACK;

/// Upper bound on pending writes between flushes — two full tracks' worth,
/// comfortably inside what a format or a multi-cluster write can generate
/// before the caller gets a chance to flush explicitly.
pub const WRITE_BATCH_MAX: usize = 36;

struct Pending {
    cylinder: u8,
    head: u8,
    sector_n: u8,
    data: crate::media::SectorData,
}

/// A bounded set of staged sector writes, flushed in whole-track groups.
pub struct WriteBatch {
    pending: [Option<Pending>; WRITE_BATCH_MAX],
    len: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self {
            pending: core::array::from_fn(|_| None),
            len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Stages one sector write, replacing any existing pending write for
    /// the same (cylinder, head, sector#). If the batch is full, the
    /// caller must flush before staging more.
    pub fn stage(&mut self, cylinder: u8, head: u8, sector_n: u8, data: crate::media::SectorData) -> bool {
        for slot in self.pending.iter_mut().flatten() {
            if slot.cylinder == cylinder && slot.head == head && slot.sector_n == sector_n {
                slot.data = data;
                return true;
            }
        }
        if self.len >= WRITE_BATCH_MAX {
            return false;
        }
        for slot in self.pending.iter_mut() {
            if slot.is_none() {
                *slot = Some(Pending {
                    cylinder,
                    head,
                    sector_n,
                    data,
                });
                self.len += 1;
                return true;
            }
        }
        false
    }

    /// Flushes every pending write for one (cylinder, head) as a whole
    /// track, requeueing entries for other tracks rather than dropping
    /// them. Sectors the batch didn't stage are filled in from disk by
    /// `MediaIo::write`.
    pub fn flush_all<M: MediaIo>(&mut self, media: &mut M) -> bool {
        let mut ok = true;
        while let Some((cylinder, head)) = self.first_pending_track() {
            ok &= self.flush_track(media, cylinder, head);
        }
        ok
    }

    fn first_pending_track(&self) -> Option<(u8, u8)> {
        self.pending
            .iter()
            .flatten()
            .next()
            .map(|p| (p.cylinder, p.head))
    }

    /// Flushes only the entries belonging to one (cylinder, head); other
    /// entries are left staged.
    pub fn flush_track<M: MediaIo>(&mut self, media: &mut M, cylinder: u8, head: u8) -> bool {
        let mut track = Track::blank(cylinder, head);
        let mut touched = false;

        for slot in self.pending.iter_mut() {
            let take = matches!(slot, Some(p) if p.cylinder == cylinder && p.head == head);
            if take {
                let p = slot.take().unwrap();
                self.len -= 1;
                let idx = (p.sector_n - 1) as usize;
                if idx < SECTORS_PER_TRACK {
                    track.sectors[idx].data = p.data;
                    track.sectors[idx].valid = true;
                    touched = true;
                }
            }
        }

        if !touched {
            return true;
        }
        media.write(&mut track)
    }

    /// Staged data for (cylinder, head, sector#), if any — lets readers see
    /// their own uncommitted writes before the batch flushes.
    pub fn peek(&self, cylinder: u8, head: u8, sector_n: u8) -> Option<&crate::media::SectorData> {
        self.pending.iter().flatten().find_map(|p| {
            (p.cylinder == cylinder && p.head == head && p.sector_n == sector_n).then(|| &p.data)
        })
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Sector;

    struct RamMedia {
        tracks: std::collections::HashMap<(u8, u8), Track>,
    }

    impl RamMedia {
        fn new() -> Self {
            Self {
                tracks: std::collections::HashMap::new(),
            }
        }
    }

    impl MediaIo for RamMedia {
        fn read(&mut self, sector: &mut Sector) -> bool {
            if let Some(track) = self.tracks.get(&(sector.cylinder, sector.head)) {
                let idx = (sector.sector_n - 1) as usize;
                if track.sectors[idx].valid {
                    sector.data = track.sectors[idx].data.clone();
                    sector.valid = true;
                    return true;
                }
            }
            false
        }
        fn write(&mut self, track: &mut Track) -> bool {
            self.tracks.insert((track.cylinder, track.head), track.clone());
            true
        }
        fn disk_changed(&mut self) -> bool {
            false
        }
        fn write_protected(&mut self) -> bool {
            false
        }
    }

    #[test]
    fn stages_and_flushes_grouped_by_track() {
        let mut batch = WriteBatch::new();
        let mut media = RamMedia::new();

        batch.stage(0, 0, 1, Default::default());
        batch.stage(0, 0, 2, Default::default());
        batch.stage(1, 0, 1, Default::default());
        assert_eq!(batch.len(), 3);

        assert!(batch.flush_all(&mut media));
        assert!(batch.is_empty());
        assert!(media.tracks.contains_key(&(0, 0)));
        assert!(media.tracks.contains_key(&(1, 0)));
    }

    #[test]
    fn flush_track_only_touches_that_track() {
        let mut batch = WriteBatch::new();
        let mut media = RamMedia::new();

        batch.stage(0, 0, 1, Default::default());
        batch.stage(1, 0, 1, Default::default());

        assert!(batch.flush_track(&mut media, 0, 0));
        assert_eq!(batch.len(), 1);
        assert!(media.tracks.contains_key(&(0, 0)));
        assert!(!media.tracks.contains_key(&(1, 0)));
    }
}
