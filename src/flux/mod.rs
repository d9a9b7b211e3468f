//! Flux-level drive control: motor/select power management, seeking and
//! track-0 recalibration, and read-with-retry / write-with-verify built on
//! top of a [`crate::hal::FloppyHal`] implementation.

pub mod drive;

pub use drive::FloppyDrive;
