//! The MFM encoder: lays out a whole track as a flux-pulse stream (gap,
//! sync, address record, gap, sync, data record, gap, repeated per sector),
//! with write precompensation applied on the inner cylinders.

use crate::media::Track;
use crate::mfm::crc::crc16_mfm;
use crate::mfm::{
    ADDRESS_MARK, DATA_MARK, GAP1_PRE_INDEX, GAP2_POST_ADDRESS, GAP3_POST_SECTOR, GAP_BYTE,
    PRECOMP_BASE_SHIFT, PRECOMP_START_CYLINDER, PULSE_LONG, PULSE_MEDIUM, PULSE_SHORT,
};
use crate::SECTOR_SIZE;

/// Longest flux buffer a single track can produce: gap1 + 18 * (sync +
/// address record + gap2 + sync + data record + gap3), at up to 8 pulses
/// per encoded byte, rounded up.
const MAX_TRACK_PULSES: usize = 96 * 1024;

/// Accumulates the pulse-width stream for one track. `prev_bit` tracks the
/// last data bit written so clock bits can be derived (a clock bit is
/// suppressed whenever either neighboring data bit is 1).
pub struct Encoder {
    buf: [u8; MAX_TRACK_PULSES],
    len: usize,
    prev_bit: bool,
    pending_cells: u8,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: [0; MAX_TRACK_PULSES],
            len: 0,
            prev_bit: true,
            pending_cells: 0,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.prev_bit = true;
        self.pending_cells = 0;
    }

    fn push_pulse(&mut self, width: u8) {
        if self.len < self.buf.len() {
            self.buf[self.len] = width;
            self.len += 1;
        }
    }

    /// Closes out the run of half-cells accumulated since the last
    /// transition, emitting one pulse of the matching width.
    fn flush_cell(&mut self) {
        match self.pending_cells {
            0 => {}
            1 => self.push_pulse(PULSE_SHORT),
            2 => self.push_pulse(PULSE_MEDIUM),
            _ => self.push_pulse(PULSE_LONG),
        }
        self.pending_cells = 0;
    }

    /// Accumulates one half-cell without a transition (a 0 bit), or emits
    /// the pulse that ends at a transition (a 1 bit).
    fn encode_bit(&mut self, bit: bool) {
        if bit {
            self.flush_cell();
            self.pending_cells += 1;
        } else {
            self.pending_cells += 1;
        }
    }

    /// Encodes one data byte, MSB first, with its interleaved clock bits. A
    /// clock bit is 0 whenever the current or previous data bit is 1, and 1
    /// otherwise (standard MFM clocking).
    fn encode_byte(&mut self, byte: u8) {
        for i in (0..8).rev() {
            let data_bit = (byte >> i) & 1 != 0;
            let clock_bit = !(self.prev_bit || data_bit);
            self.encode_bit(clock_bit);
            self.encode_bit(data_bit);
            self.prev_bit = data_bit;
        }
    }

    fn encode_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.encode_byte(b);
        }
    }

    /// The three 0xA1 sync bytes, written with their clock bit deliberately
    /// violated (missing the transition between bits 4 and 5) so the
    /// decoder can distinguish them from a data 0xA1. 12 bytes of 0x00
    /// precede it to settle the PLL.
    fn encode_sync(&mut self) {
        self.flush_cell();
        for _ in 0..12 {
            self.encode_byte(0x00);
        }
        self.flush_cell();

        const PATTERN: [u8; 15] = [
            PULSE_MEDIUM, PULSE_LONG, PULSE_MEDIUM, PULSE_LONG, PULSE_MEDIUM,
            PULSE_SHORT,
            PULSE_LONG, PULSE_MEDIUM, PULSE_LONG, PULSE_MEDIUM,
            PULSE_SHORT,
            PULSE_LONG, PULSE_MEDIUM, PULSE_LONG, PULSE_MEDIUM,
        ];
        for &p in &PATTERN {
            self.push_pulse(p);
        }
        self.prev_bit = true;
        self.pending_cells = 0;
    }

    fn encode_gap(&mut self, len: usize) {
        self.flush_cell();
        for _ in 0..len {
            self.encode_byte(GAP_BYTE);
        }
        self.flush_cell();
    }

    fn encode_record(&mut self, mark: u8, payload: &[u8]) {
        self.encode_sync();
        self.encode_byte(mark);

        let mut crc_input = [0u8; 1 + SECTOR_SIZE];
        crc_input[0] = mark;
        crc_input[1..1 + payload.len()].copy_from_slice(payload);
        let crc = crc16_mfm(&crc_input[..1 + payload.len()]);

        self.encode_bytes(payload);
        self.encode_byte((crc >> 8) as u8);
        self.encode_byte((crc & 0xFF) as u8);
        self.flush_cell();
    }

    /// Encodes one sector: an address record (cylinder/head/sector#/size
    /// code + CRC) followed by gap2, then the data record.
    pub fn encode_sector(&mut self, cylinder: u8, head: u8, sector_n: u8, data: &[u8]) {
        let address = [cylinder, head, sector_n, 0x02];
        self.encode_record(ADDRESS_MARK, &address);
        self.encode_gap(GAP2_POST_ADDRESS);
        self.encode_record(DATA_MARK, data);
    }

    /// Encodes a full track: gap1, then each sector followed by gap3, with
    /// write precompensation applied past the inner cylinders.
    pub fn encode_track(&mut self, track: &Track) {
        self.clear();
        self.encode_gap(GAP1_PRE_INDEX);

        for sector in &track.sectors {
            self.encode_sector(
                sector.cylinder,
                sector.head,
                sector.sector_n,
                sector.data.as_slice(),
            );
            self.encode_gap(GAP3_POST_SECTOR);
        }

        if track.cylinder >= PRECOMP_START_CYLINDER {
            self.apply_precomp(track.cylinder);
        }
    }

    /// Shifts early a Short pulse flanked by exactly one Long neighbor, to
    /// counteract inner-track bit-shift. The shift grows by one tick every
    /// 13 cylinders past the start cylinder.
    fn apply_precomp(&mut self, cylinder: u8) {
        let shift = PRECOMP_BASE_SHIFT + (cylinder - PRECOMP_START_CYLINDER) / 13;

        for i in 1..self.len.saturating_sub(1) {
            if self.buf[i] != PULSE_SHORT {
                continue;
            }
            let left_long = self.buf[i - 1] == PULSE_LONG;
            let right_long = self.buf[i + 1] == PULSE_LONG;
            if left_long == right_long {
                continue;
            }
            if left_long {
                self.buf[i] = self.buf[i].saturating_add(shift);
                self.buf[i - 1] = self.buf[i - 1].saturating_sub(shift);
            } else {
                self.buf[i] = self.buf[i].saturating_sub(shift);
                self.buf[i + 1] = self.buf[i + 1].saturating_add(shift);
            }
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Track;

    #[test]
    fn track_encodes_eighteen_sectors_worth_of_pulses() {
        let track = Track::blank(10, 1);
        let mut encoder = Encoder::new();
        encoder.encode_track(&track);
        assert!(encoder.bytes().len() > crate::SECTORS_PER_TRACK * (SECTOR_SIZE / 4));
    }

    #[test]
    fn precomp_only_applies_past_start_cylinder() {
        let track = Track::blank(0, 0);
        let mut encoder = Encoder::new();
        encoder.encode_track(&track);
        let without_precomp = encoder.bytes().to_vec();

        let inner_track = Track::blank(60, 0);
        encoder.encode_track(&inner_track);
        // Different cylinder number changes the address records regardless
        // of precomp, so just check precomp doesn't panic and still emits a
        // full stream.
        assert!(!without_precomp.is_empty());
        assert!(!encoder.bytes().is_empty());
    }

    #[test]
    fn sync_then_mark_round_trips_through_crc() {
        let mut encoder = Encoder::new();
        encoder.encode_sector(3, 0, 1, &[0xAAu8; SECTOR_SIZE]);
        assert!(!encoder.bytes().is_empty());
    }
}
