//! The MFM decoder: a push-fed state machine that eats one flux `delta`
//! per step and emits a CRC-validated `Sector` whenever a data record
//! follows a validated address record.
//!
//! States: `Hunt -> Syncing(stage) -> Data <-> Clock`. `Data` and `Clock`
//! alternate within one record; a mismatch or a CRC-violating long pulse in
//! `Clock` drops back to `Hunt`.

use crate::media::Sector;
use crate::mfm::crc::MfmCrc;
use crate::mfm::{
    Pulse, ADDRESS_MARK, DATA_MARK, DELETED_DATA_MARK, MIN_PREAMBLE, PULSE_CEILING, PULSE_FLOOR,
    SYNC_PATTERN,
};
use crate::SECTOR_SIZE;

/// Largest possible record: 1 mark byte + a 512-byte sector + 2 CRC bytes.
const MAX_RECORD_LEN: usize = 1 + SECTOR_SIZE + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Hunt,
    Syncing(u8),
    Data,
    Clock,
}

struct PendingAddress {
    cylinder: u8,
    head: u8,
    sector_n: u8,
    size_code: u8,
}

/// Running decode statistics, surfaced for diagnostics (analogous to the
/// original firmware's end-of-session stats dump).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub syncs_found: u32,
    pub sectors_read: u32,
    pub crc_errors: u32,
}

/// Streaming MFM decoder. Feed it one flux-transition delta at a time via
/// [`Decoder::feed`]; it yields a decoded sector whenever one completes.
pub struct Decoder {
    state: State,

    t_cell: u32,
    t2_max: u32,
    t3_max: u32,

    short_count: u32,
    preamble_sum: u32,

    crc: Option<MfmCrc>,
    byte_acc: u8,
    bit_count: u8,

    buf: [u8; MAX_RECORD_LEN],
    buf_pos: usize,
    bytes_expected: usize,
    overflow: bool,

    pending_addr: Option<PendingAddress>,

    stats: DecoderStats,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: State::Hunt,
            t_cell: 0,
            t2_max: 57,
            t3_max: 82,
            short_count: 0,
            preamble_sum: 0,
            crc: None,
            byte_acc: 0,
            bit_count: 0,
            buf: [0; MAX_RECORD_LEN],
            buf_pos: 0,
            bytes_expected: 0,
            overflow: false,
            pending_addr: None,
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drops back to `Hunt` without touching the adaptive timing state,
    /// matching a resynchronization after one record (successful or not).
    pub fn reset(&mut self) {
        self.state = State::Hunt;
        self.short_count = 0;
        self.preamble_sum = 0;
    }

    fn classify(&mut self, delta: u16) -> Option<Pulse> {
        if delta < PULSE_FLOOR {
            return None;
        }
        if delta <= self.t2_max as u16 {
            if matches!(self.state, State::Data | State::Clock)
                && self.t_cell > 0
                && (delta as u32) <= self.t_cell + (self.t_cell >> 3)
            {
                let diff = delta as i32 - self.t_cell as i32 + 8;
                self.t_cell = (self.t_cell as i32 + (diff >> 4)) as u32;
                self.t2_max = self.t_cell * 5 / 4;
                self.t3_max = self.t_cell * 7 / 4;
            }
            return Some(Pulse::Short);
        }
        if delta <= self.t3_max as u16 {
            return Some(Pulse::Medium);
        }
        if delta < PULSE_CEILING {
            return Some(Pulse::Long);
        }
        None
    }

    fn push_bit(&mut self, bit: bool) {
        self.byte_acc = (self.byte_acc << 1) | (bit as u8);
        self.bit_count += 1;

        if self.bit_count >= 8 {
            if self.buf_pos < self.buf.len() {
                self.buf[self.buf_pos] = self.byte_acc;
                self.buf_pos += 1;
            } else {
                self.overflow = true;
            }
            if let Some(crc) = self.crc.as_mut() {
                crc.update(self.byte_acc);
            }
            self.bit_count = 0;
            self.byte_acc = 0;
        }
    }

    /// Feeds one inter-transition interval (in coprocessor ticks). Returns
    /// a decoded sector whenever a data record completes.
    pub fn feed(&mut self, delta: u16) -> Option<Sector> {
        let pulse = self.classify(delta)?;

        match self.state {
            State::Hunt => {
                match pulse {
                    Pulse::Short => {
                        self.short_count += 1;
                        self.preamble_sum += delta as u32;
                    }
                    _ => {
                        if self.short_count >= MIN_PREAMBLE {
                            self.t_cell = self.preamble_sum / self.short_count;
                            self.t2_max = self.t_cell * 5 / 4;
                            self.t3_max = self.t_cell * 7 / 4;
                            if pulse == Pulse::Medium {
                                self.state = State::Syncing(1);
                            }
                        }
                        self.short_count = 0;
                        self.preamble_sum = 0;
                    }
                }
                None
            }

            State::Syncing(stage) => {
                if pulse == SYNC_PATTERN[stage as usize] {
                    let next = stage + 1;
                    if next as usize >= SYNC_PATTERN.len() {
                        self.stats.syncs_found += 1;
                        self.state = State::Data;
                        self.byte_acc = 0;
                        self.bit_count = 0;
                        self.buf_pos = 0;
                        self.bytes_expected = 0;
                        self.overflow = false;
                        self.crc = Some(MfmCrc::new());
                    } else {
                        self.state = State::Syncing(next);
                    }
                } else {
                    if pulse == Pulse::Short {
                        self.short_count = 1;
                        self.preamble_sum = delta as u32;
                    } else {
                        self.short_count = 0;
                        self.preamble_sum = 0;
                    }
                    self.state = State::Hunt;
                }
                None
            }

            State::Data => {
                match pulse {
                    Pulse::Short => self.push_bit(true),
                    Pulse::Medium => {
                        self.push_bit(false);
                        self.push_bit(false);
                        self.state = State::Clock;
                    }
                    Pulse::Long => {
                        self.push_bit(false);
                        self.push_bit(true);
                    }
                }
                self.check_record()
            }

            State::Clock => {
                match pulse {
                    Pulse::Short => self.push_bit(false),
                    Pulse::Medium => {
                        self.push_bit(true);
                        self.state = State::Data;
                    }
                    Pulse::Long => {
                        // A long pulse here can only mean a CRC-violating
                        // desync; bail without inspecting the record.
                        self.reset();
                        return None;
                    }
                }
                self.check_record()
            }
        }
    }

    fn check_record(&mut self) -> Option<Sector> {
        if self.buf_pos == 1 && self.bytes_expected == 0 {
            match self.buf[0] {
                ADDRESS_MARK => self.bytes_expected = 7,
                DATA_MARK | DELETED_DATA_MARK => {
                    self.bytes_expected = match &self.pending_addr {
                        Some(addr) => 1 + (128usize << addr.size_code) + 2,
                        None => 1 + SECTOR_SIZE + 2,
                    };
                }
                _ => {
                    self.reset();
                    return None;
                }
            }
        }

        if self.bytes_expected == 0 || self.buf_pos < self.bytes_expected {
            return None;
        }

        let mark = self.buf[0];
        let crc_ok = self.crc.take().map(|c| c.finalize() == 0).unwrap_or(false);

        if mark == ADDRESS_MARK {
            if crc_ok {
                let size_code = (self.buf[4] & 0x03).min(2);
                self.pending_addr = Some(PendingAddress {
                    cylinder: self.buf[1],
                    head: self.buf[2],
                    sector_n: self.buf[3],
                    size_code,
                });
            } else {
                self.stats.crc_errors += 1;
                self.pending_addr = None;
            }
            self.reset();
            None
        } else if (mark == DATA_MARK || mark == DELETED_DATA_MARK) && self.pending_addr.is_some() {
            let addr = self.pending_addr.take().unwrap();
            let size = 128usize << addr.size_code;

            let mut sector = Sector::blank(addr.cylinder, addr.head, addr.sector_n);
            sector.size_code = addr.size_code;
            sector.valid = crc_ok && !self.overflow;

            let mut copy_size = size.min(SECTOR_SIZE);
            copy_size = copy_size.min(self.buf_pos.saturating_sub(1));
            if copy_size > 0 {
                sector.data[..copy_size].copy_from_slice(&self.buf[1..1 + copy_size]);
            }

            self.stats.sectors_read += 1;
            if !crc_ok {
                self.stats.crc_errors += 1;
            }

            self.reset();
            Some(sector)
        } else {
            self.reset();
            None
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfm::encode::Encoder;
    use crate::media::Track;

    fn decode_all(flux: &[u8]) -> Vec<Sector> {
        let mut decoder = Decoder::new();
        let mut out = Vec::new();
        for &pulse in flux {
            if let Some(sector) = decoder.feed(pulse as u16) {
                out.push(sector);
            }
        }
        out
    }

    #[test]
    fn round_trips_a_full_track() {
        let mut track = Track::blank(5, 0);
        for (i, sector) in track.sectors.iter_mut().enumerate() {
            sector.valid = true;
            for (j, byte) in sector.data.iter_mut().enumerate() {
                *byte = ((i * 37 + j) & 0xFF) as u8;
            }
        }

        let mut encoder = Encoder::new();
        encoder.encode_track(&track);

        let decoded = decode_all(encoder.bytes());
        assert_eq!(decoded.len(), crate::SECTORS_PER_TRACK);
        for sector in &decoded {
            assert!(sector.valid);
            let expected = &track.sectors[(sector.sector_n - 1) as usize];
            assert_eq!(sector.data.as_slice(), expected.data.as_slice());
        }
    }

    #[test]
    fn tolerates_small_jitter() {
        let mut track = Track::blank(0, 0);
        track.sectors[0].valid = true;
        track.sectors[0].data[0] = 0xAB;

        let mut encoder = Encoder::new();
        encoder.encode_track(&track);

        let jittered: Vec<u8> = encoder
            .bytes()
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let jitter = [2i16, -2, 1, -1, 0][i % 5];
                (p as i16 + jitter).clamp(1, 255) as u8
            })
            .collect();

        let decoded = decode_all(&jittered);
        assert!(decoded.iter().any(|s| s.valid && s.sector_n == 1));
    }
}
