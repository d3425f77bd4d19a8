//! Trait definitions for hardware abstraction.
//!
//! This module defines the core abstractions that allow prl-launcher to:
//! - Run on the rig's GPIO (Linux sysfs) or on desktop mocks
//! - Drive every wait (launch pulse, limit reversal, poll interval) from an
//!   injectable time source so tests never sleep
//!
//! # Hardware Abstraction
//!
//! - [`GpioBackend`]: relay writes, switch reads, falling-edge callbacks
//! - [`Clock`] / [`Delay`]: time and blocking waits, combined as [`Timebase`]
//!
//! The axis vocabulary ([`Axis`], [`AxisDirection`], [`Level`]) lives here
//! too, since every backend and component speaks it.

pub mod hardware;

pub use hardware::*;
