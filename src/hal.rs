//! The hardware boundary: everything this crate needs from the drive's
//! GPIO/PIO/timer primitives, specified only by its contract. A platform
//! provides an implementation; this crate never touches a register
//! directly.

/// Step direction, relative to the spindle center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Inward,
    Outward,
}

/// One flux read word: the coprocessor's timestamp counter value at the
/// time of the transition, plus the mechanical index line's current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FluxWord {
    /// Free-running counter value, wrapping at 15 bits.
    pub count: u16,
    /// Current level of the index sensor.
    pub index: bool,
}

/// GPIO/PIO/timer boundary for one floppy drive.
///
/// Every method is specified only by its contract: a platform's PIO state
/// machines, GPIO pins, and delay primitives satisfy it however is natural
/// for that target.
pub trait FloppyHal {
    /// Milliseconds to wait after asserting motor-enable before the drive
    /// is usable. Override for drives that spin up faster/slower.
    const MOTOR_SPINUP_MS: u32 = 750;
    /// Milliseconds to wait after asserting drive-select before it settles.
    const SELECT_SETTLE_MS: u32 = 10;

    fn step(&mut self, direction: StepDirection);
    fn side_select(&mut self, head: u8);
    fn motor_enable(&mut self, on: bool);
    fn drive_select(&mut self, on: bool);

    fn at_track0(&mut self) -> bool;
    fn write_protected(&mut self) -> bool;
    /// Latched disk-change sensor read. The caller (the flux layer) is
    /// responsible for issuing the recalibration step that re-arms it.
    fn disk_change_latched(&mut self) -> bool;

    fn wait_for_index_edge(&mut self);

    fn flux_read_start(&mut self);
    fn flux_read_stop(&mut self);
    /// Blocks until the next flux transition (or index edge) is available.
    fn read_flux_word(&mut self) -> FluxWord;

    fn flux_write_start(&mut self);
    /// Streams one pulse-cell timing (in the encoder's tick units) to the
    /// write coprocessor; blocks if its transmit queue is full.
    fn write_pulse(&mut self, ticks: u8);
    /// Blocks until the transmit queue drains, then de-asserts write-gate
    /// after a ≥5 µs tail delay.
    fn flux_write_stop(&mut self);

    fn sleep_us(&mut self, us: u32);
    fn sleep_ms(&mut self, ms: u32);
    fn now_ms(&mut self) -> u32;
}
