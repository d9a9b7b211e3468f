//! A single physical drive wired to a [`FloppyHal`], exposing the
//! [`MediaIo`] vtable the FAT engine drives.

use crate::hal::{FloppyHal, StepDirection};
use crate::media::{MediaIo, Sector, Track};
use crate::mfm::{Decoder, Encoder};
use crate::mutex::{Mutex, MutexInterface};
use crate::SECTORS_PER_TRACK;

/// Motor/select power down after this many idle milliseconds.
pub const IDLE_TIMEOUT_MS: u32 = 20_000;
/// Expected cadence of [`FloppyDrive::tick_idle_timer`] calls.
pub const IDLE_CHECK_INTERVAL_MS: u32 = 1_000;

/// Index edges allowed while hunting for sectors on one track read attempt
/// (15 revolutions, two edges each).
const READ_TRACK_ATTEMPTS: u32 = 15;
const HEAD_SETTLE_MS: u32 = 20;
const STEP_PULSE_US: u32 = 10;
const STEP_SETTLE_MS: u32 = 10;
const TRACK0_MAX_STEPS: u8 = 90;
const JOG_SMALL: u8 = 10;
const JOG_LARGE: u8 = 20;
const WRITE_ATTEMPTS: u32 = 3;
const VERIFY_ATTEMPTS: u32 = 3;

struct IdleState {
    motor_on: bool,
    last_activity_ms: u32,
}

/// Flux-level drive control built on a [`FloppyHal`]: seeking, read with
/// head-jog retries, write with verify, and motor/select idle power-down.
pub struct FloppyDrive<H: FloppyHal> {
    hal: H,
    state: Mutex<IdleState>,
    current_cylinder: u8,
}

impl<H: FloppyHal> FloppyDrive<H> {
    pub fn new(hal: H) -> Self {
        Self {
            hal,
            state: Mutex::new(IdleState {
                motor_on: false,
                last_activity_ms: 0,
            }),
            current_cylinder: 0,
        }
    }

    fn mark_active(&mut self) {
        let now = self.hal.now_ms();
        self.state.cs(|s| s.last_activity_ms = now);
    }

    fn ensure_ready(&mut self, head: u8) {
        let already_on = self.state.cs(|s| s.motor_on);
        if !already_on {
            self.hal.motor_enable(true);
            self.hal.sleep_ms(H::MOTOR_SPINUP_MS);
        }
        self.hal.drive_select(true);
        self.hal.side_select(head);
        if !already_on {
            self.hal.sleep_ms(H::SELECT_SETTLE_MS);
        }
        let now = self.hal.now_ms();
        self.state.cs(|s| {
            s.motor_on = true;
            s.last_activity_ms = now;
        });
    }

    /// Powers the motor and drive-select line down once idle for
    /// [`IDLE_TIMEOUT_MS`]. Call this at roughly [`IDLE_CHECK_INTERVAL_MS`].
    pub fn tick_idle_timer(&mut self) {
        let now = self.hal.now_ms();
        let expired = self
            .state
            .cs(|s| s.motor_on && now.wrapping_sub(s.last_activity_ms) >= IDLE_TIMEOUT_MS);
        if expired {
            self.hal.motor_enable(false);
            self.hal.drive_select(false);
            self.state.cs(|s| s.motor_on = false);
        }
    }

    fn step_one(&mut self, direction: StepDirection) {
        self.hal.step(direction);
        self.hal.sleep_us(STEP_PULSE_US);
        self.hal.sleep_ms(STEP_SETTLE_MS);
    }

    fn seek_to(&mut self, cylinder: u8) {
        if self.current_cylinder == cylinder {
            return;
        }
        let direction = if cylinder > self.current_cylinder {
            StepDirection::Inward
        } else {
            StepDirection::Outward
        };
        let steps = (cylinder as i16 - self.current_cylinder as i16).unsigned_abs() as u8;
        for _ in 0..steps {
            self.step_one(direction);
        }
        self.current_cylinder = cylinder;
    }

    /// Recalibrates to cylinder 0 by stepping outward, up to
    /// [`TRACK0_MAX_STEPS`] times.
    pub fn recalibrate(&mut self) -> bool {
        if self.hal.at_track0() {
            self.current_cylinder = 0;
            return true;
        }
        for _ in 0..TRACK0_MAX_STEPS {
            self.step_one(StepDirection::Outward);
            if self.hal.at_track0() {
                self.current_cylinder = 0;
                return true;
            }
        }
        false
    }

    /// Steps away from the current cylinder and back, to resettle marginal
    /// media before a re-read.
    fn jog(&mut self, distance: u8) {
        let origin = self.current_cylinder;
        if origin == 0 {
            self.seek_to(distance);
        } else {
            self.seek_to(origin.saturating_sub(distance));
        }
        self.seek_to(origin);
    }

    /// One-cylinder step-out-then-in (or step-in-then-out at cylinder 0) to
    /// re-arm the latched disk-change sensor.
    fn rearm_disk_change(&mut self) {
        if self.current_cylinder == 0 {
            self.step_one(StepDirection::Inward);
            self.step_one(StepDirection::Outward);
        } else {
            self.step_one(StepDirection::Outward);
            self.step_one(StepDirection::Inward);
        }
    }

    fn capture_track(&mut self, cylinder: u8, head: u8) -> Track {
        self.hal.side_select(head);
        let mut track = Track::blank(cylinder, head);
        let mut decoder = Decoder::new();

        self.hal.flux_read_start();
        self.hal.wait_for_index_edge();

        let mut edges = 0u32;
        let mut found = 0usize;
        while edges < READ_TRACK_ATTEMPTS * 2 && found < SECTORS_PER_TRACK {
            let word = self.hal.read_flux_word();
            if word.index {
                edges += 1;
            }
            if let Some(sector) = decoder.feed(word.count) {
                if sector.cylinder == cylinder && sector.head == head {
                    let idx = sector.sector_n.saturating_sub(1) as usize;
                    if idx < SECTORS_PER_TRACK && !track.sectors[idx].valid {
                        track.sectors[idx] = sector;
                        found += 1;
                    }
                }
            }
        }

        self.hal.flux_read_stop();
        track
    }

    /// Reads a whole track, retrying with a head jog (10, then 20
    /// cylinders) on any sector that doesn't come back valid.
    pub fn read_track(&mut self, cylinder: u8, head: u8) -> Track {
        self.ensure_ready(head);
        self.seek_to(cylinder);

        let mut track = self.capture_track(cylinder, head);

        for &distance in &[JOG_SMALL, JOG_LARGE] {
            if track.all_valid() {
                break;
            }
            self.jog(distance);
            let jogged = self.capture_track(cylinder, head);
            for (slot, sector) in track.sectors.iter_mut().zip(jogged.sectors.iter()) {
                if !slot.valid && sector.valid {
                    *slot = sector.clone();
                }
            }
        }

        self.mark_active();
        track
    }

    fn emit_track(&mut self, head: u8, pulses: &[u8]) {
        self.hal.side_select(head);
        self.hal.wait_for_index_edge();
        self.hal.flux_write_start();
        for &p in pulses {
            self.hal.write_pulse(p);
        }
        self.hal.flux_write_stop();
    }

    fn tracks_match(written: &Track, readback: &Track) -> bool {
        written
            .sectors
            .iter()
            .zip(readback.sectors.iter())
            .all(|(w, r)| !w.valid || (r.valid && r.data == w.data))
    }

    /// Writes a track, verifying the result by reading it back; retries up
    /// to [`WRITE_ATTEMPTS`] times, forcing a track-0 recalibration on the
    /// last attempt.
    pub fn write_track_verified(&mut self, track: &Track) -> bool {
        self.ensure_ready(track.head);

        let mut encoder = Encoder::new();
        encoder.encode_track(track);

        for attempt in 0..WRITE_ATTEMPTS {
            if attempt + 1 == WRITE_ATTEMPTS {
                self.recalibrate();
            }
            self.seek_to(track.cylinder);
            self.emit_track(track.head, encoder.bytes());

            for _ in 0..VERIFY_ATTEMPTS {
                self.jog(JOG_SMALL);
                self.hal.sleep_ms(HEAD_SETTLE_MS);
                self.seek_to(track.cylinder);

                let readback = self.capture_track(track.cylinder, track.head);
                if Self::tracks_match(track, &readback) {
                    self.mark_active();
                    return true;
                }
            }
        }

        self.mark_active();
        false
    }
}

impl<H: FloppyHal> MediaIo for FloppyDrive<H> {
    fn read(&mut self, sector: &mut Sector) -> bool {
        let track = self.read_track(sector.cylinder, sector.head);
        let idx = sector.sector_n.saturating_sub(1) as usize;
        if idx >= SECTORS_PER_TRACK || !track.sectors[idx].valid {
            return false;
        }
        sector.data = track.sectors[idx].data.clone();
        sector.size_code = track.sectors[idx].size_code;
        sector.valid = true;
        true
    }

    fn write(&mut self, track: &mut Track) -> bool {
        if !track.all_valid() {
            let existing = self.read_track(track.cylinder, track.head);
            for (slot, have) in track.sectors.iter_mut().zip(existing.sectors.iter()) {
                if !slot.valid && have.valid {
                    *slot = have.clone();
                }
            }
        }
        self.write_track_verified(track)
    }

    fn disk_changed(&mut self) -> bool {
        if !self.hal.disk_change_latched() {
            return false;
        }
        self.rearm_disk_change();
        true
    }

    fn write_protected(&mut self) -> bool {
        self.hal.write_protected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::FluxWord;

    /// A HAL double with no mechanical behavior beyond tracking step counts
    /// and a fake clock; enough to exercise seeking and the idle timer
    /// without a real flux stream.
    struct FakeHal {
        cylinder: u8,
        clock_ms: u32,
        motor: bool,
    }

    impl FakeHal {
        fn new() -> Self {
            Self {
                cylinder: 0,
                clock_ms: 0,
                motor: false,
            }
        }
    }

    impl FloppyHal for FakeHal {
        fn step(&mut self, direction: StepDirection) {
            match direction {
                StepDirection::Inward => self.cylinder += 1,
                StepDirection::Outward => self.cylinder = self.cylinder.saturating_sub(1),
            }
        }
        fn side_select(&mut self, _head: u8) {}
        fn motor_enable(&mut self, on: bool) {
            self.motor = on;
        }
        fn drive_select(&mut self, _on: bool) {}
        fn at_track0(&mut self) -> bool {
            self.cylinder == 0
        }
        fn write_protected(&mut self) -> bool {
            false
        }
        fn disk_change_latched(&mut self) -> bool {
            false
        }
        fn wait_for_index_edge(&mut self) {}
        fn flux_read_start(&mut self) {}
        fn flux_read_stop(&mut self) {}
        fn read_flux_word(&mut self) -> FluxWord {
            FluxWord {
                count: 0,
                index: true,
            }
        }
        fn flux_write_start(&mut self) {}
        fn write_pulse(&mut self, _ticks: u8) {}
        fn flux_write_stop(&mut self) {}
        fn sleep_us(&mut self, _us: u32) {}
        fn sleep_ms(&mut self, ms: u32) {
            self.clock_ms += ms;
        }
        fn now_ms(&mut self) -> u32 {
            self.clock_ms
        }
    }

    #[test]
    fn seek_tracks_cylinder_position() {
        let mut drive = FloppyDrive::new(FakeHal::new());
        drive.seek_to(40);
        assert_eq!(drive.current_cylinder, 40);
        drive.seek_to(5);
        assert_eq!(drive.current_cylinder, 5);
    }

    #[test]
    fn recalibrate_reaches_track0() {
        let mut drive = FloppyDrive::new(FakeHal::new());
        drive.current_cylinder = 30;
        drive.hal.cylinder = 30;
        assert!(drive.recalibrate());
        assert_eq!(drive.current_cylinder, 0);
    }

    #[test]
    fn idle_timer_powers_down_after_timeout() {
        let mut drive = FloppyDrive::new(FakeHal::new());
        drive.ensure_ready(0);
        assert!(drive.hal.motor);

        drive.hal.clock_ms += IDLE_TIMEOUT_MS;
        drive.tick_idle_timer();
        assert!(!drive.hal.motor);
    }

    #[test]
    fn idle_timer_leaves_motor_on_before_timeout() {
        let mut drive = FloppyDrive::new(FakeHal::new());
        drive.ensure_ready(0);
        drive.hal.clock_ms += IDLE_TIMEOUT_MS - 1;
        drive.tick_idle_timer();
        assert!(drive.hal.motor);
    }
}
