//! The MFM codec: a streaming decoder that synchronizes to a preamble and
//! extracts CRC-validated sectors from flux deltas, and an encoder that
//! lays out a full track (gap/sync/address/gap/sync/data, with write
//! precompensation on inner cylinders).

pub mod crc;
pub mod decode;
pub mod encode;

pub use decode::{Decoder, DecoderStats};
pub use encode::Encoder;

/// Record mark bytes (the first byte of a record, after sync).
pub const ADDRESS_MARK: u8 = 0xFE;
pub const DATA_MARK: u8 = 0xFB;
pub const DELETED_DATA_MARK: u8 = 0xF8;

/// Filler byte used in inter-record gaps.
pub const GAP_BYTE: u8 = 0x4E;

pub const GAP1_PRE_INDEX: usize = 80;
pub const GAP2_POST_ADDRESS: usize = 22;
pub const GAP3_POST_SECTOR: usize = 54;

/// Pulse-cell classes, in tick-width order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulse {
    Short,
    Medium,
    Long,
}

/// The flux shape of three consecutive 0xA1-with-missing-clock sync bytes.
pub const SYNC_PATTERN: [Pulse; 15] = [
    Pulse::Medium, Pulse::Long, Pulse::Medium, Pulse::Long, Pulse::Medium,
    Pulse::Short,
    Pulse::Long, Pulse::Medium, Pulse::Long, Pulse::Medium,
    Pulse::Short,
    Pulse::Long, Pulse::Medium, Pulse::Long, Pulse::Medium,
];

/// Nominal pulse widths, in coprocessor ticks, used by the encoder (the
/// decoder tracks these adaptively instead — see `decode::Decoder`).
pub const PULSE_SHORT: u8 = 48;
pub const PULSE_MEDIUM: u8 = 72;
pub const PULSE_LONG: u8 = 96;

/// Noise floor / drop-out ceiling for pulse classification.
pub const PULSE_FLOOR: u16 = 35;
pub const PULSE_CEILING: u16 = 120;

/// Minimum run of consecutive Short pulses before the preamble is
/// considered locked.
pub const MIN_PREAMBLE: u32 = 60;

/// First cylinder write precompensation applies to.
pub const PRECOMP_START_CYLINDER: u8 = 40;
/// Base precompensation shift, in ticks, at the start cylinder.
pub const PRECOMP_BASE_SHIFT: u8 = 3;
