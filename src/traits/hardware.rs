//! Hardware abstraction traits for relay outputs, switch inputs and edge detection.
//!
//! This module defines the interfaces that let the launcher core run against
//! real GPIO (Linux sysfs on the rig) or the desktop mocks used by the tests.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`GpioBackend`] | Pin configuration, level writes/reads, falling-edge watches |
//! | [`EdgeWatch`] | Handle for a registered edge callback |
//! | [`Clock`] | Monotonic millisecond time source |
//! | [`Delay`] | Blocking delay used by the launch and reversal waits |
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations
//! from [`crate::hal::mock`]. For the rig, use `hal::sysfs` (requires the
//! `sysfs` feature).
//!
//! # Example
//!
//! ```rust
//! use prl_launcher::traits::{GpioBackend, Level};
//! use prl_launcher::hal::MockGpio;
//!
//! let gpio = MockGpio::new();
//! gpio.write(25, Level::High).unwrap();
//! assert_eq!(gpio.writes_to(25), vec![Level::High]);
//!
//! gpio.set_input(15, Level::High);
//! assert_eq!(gpio.read(15).unwrap(), Level::High);
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HardwareError;
use crate::pins::LogicalPin;

/// Logic level of a GPIO pin.
///
/// # Default
///
/// Defaults to [`Low`](Self::Low): every relay starts de-energized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Pin driven or read low (0).
    #[default]
    Low,
    /// Pin driven or read high (1).
    High,
}

impl Level {
    /// Returns `true` for [`Level::High`].
    #[inline]
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    /// Converts a raw sample (0 or non-zero) to a level.
    #[inline]
    pub const fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Level::Low
        } else {
            Level::High
        }
    }

    /// Returns the level as a raw bit (0 or 1).
    #[inline]
    pub const fn as_bit(self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    /// Returns the level as an uppercase string, as printed in the audit log.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Low => "LOW",
            Level::High => "HIGH",
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turret axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Tilt (up/down).
    Vertical,
    /// Pan (clockwise/counter-clockwise).
    Horizontal,
}

impl Axis {
    /// Both axes, vertical first.
    pub const ALL: [Axis; 2] = [Axis::Vertical, Axis::Horizontal];

    /// Returns the axis as a lowercase string.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Axis::Vertical => "vertical",
            Axis::Horizontal => "horizontal",
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        match self {
            Axis::Vertical => 0,
            Axis::Horizontal => 1,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of turret travel on one axis.
///
/// Each value owns exactly one relay output and one limit switch.
/// [`Up`](Self::Up)/[`Down`](Self::Down) belong to the vertical axis,
/// [`Clockwise`](Self::Clockwise)/[`CounterClockwise`](Self::CounterClockwise)
/// to the horizontal one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisDirection {
    /// Tilt up.
    Up,
    /// Tilt down.
    Down,
    /// Pan clockwise.
    #[serde(rename = "cw")]
    Clockwise,
    /// Pan counter-clockwise.
    #[serde(rename = "ccw")]
    CounterClockwise,
}

impl AxisDirection {
    /// All four directions, in relay order.
    pub const ALL: [AxisDirection; 4] = [
        AxisDirection::Up,
        AxisDirection::Down,
        AxisDirection::Clockwise,
        AxisDirection::CounterClockwise,
    ];

    /// Returns the axis this direction moves along.
    #[inline]
    pub const fn axis(self) -> Axis {
        match self {
            AxisDirection::Up | AxisDirection::Down => Axis::Vertical,
            AxisDirection::Clockwise | AxisDirection::CounterClockwise => Axis::Horizontal,
        }
    }

    /// Returns the other direction on the same axis.
    ///
    /// ```
    /// use prl_launcher::AxisDirection;
    ///
    /// assert_eq!(AxisDirection::Up.opposite(), AxisDirection::Down);
    /// assert_eq!(AxisDirection::Clockwise.opposite(), AxisDirection::CounterClockwise);
    /// ```
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            AxisDirection::Up => AxisDirection::Down,
            AxisDirection::Down => AxisDirection::Up,
            AxisDirection::Clockwise => AxisDirection::CounterClockwise,
            AxisDirection::CounterClockwise => AxisDirection::Clockwise,
        }
    }

    /// Returns the short name used by the request layer (`up`, `down`, `cw`, `ccw`).
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            AxisDirection::Up => "up",
            AxisDirection::Down => "down",
            AxisDirection::Clockwise => "cw",
            AxisDirection::CounterClockwise => "ccw",
        }
    }

    /// Slot of this direction inside its axis (0 = up/cw, 1 = down/ccw).
    #[inline]
    pub(crate) const fn slot(self) -> usize {
        match self {
            AxisDirection::Up | AxisDirection::Clockwise => 0,
            AxisDirection::Down | AxisDirection::CounterClockwise => 1,
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.axis().index() * 2 + self.slot()
    }
}

impl fmt::Display for AxisDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked by a backend on every detected falling edge.
pub type EdgeHandler = Box<dyn FnMut() + Send + 'static>;

/// Handle for a registered falling-edge callback.
///
/// Dropping the handle without calling [`cancel`](Self::cancel) leaves the
/// behavior to the backend; the launcher always cancels explicitly.
pub trait EdgeWatch: Send {
    /// Deregisters the callback. Must be safe to call more than once.
    fn cancel(&mut self);
}

/// GPIO access for the launcher.
///
/// Pins are addressed by physical id (BCM numbering on the reference rig).
/// Writes are treated as atomic hardware operations; implementations need
/// interior mutability because the request thread, the limit monitor and the
/// encoder callbacks all share one backend.
///
/// # Implementation Notes
///
/// - `configure` is called once per pin at startup, outputs before any write
/// - Errors are never retried by callers
/// - `release` is called once at shutdown, after all outputs were driven low
pub trait GpioBackend: Send + Sync + 'static {
    /// Claim and configure a pin (direction, pull, initial level).
    fn configure(&self, pin: &LogicalPin) -> Result<(), HardwareError>;

    /// Drive an output pin.
    fn write(&self, physical_id: u32, level: Level) -> Result<(), HardwareError>;

    /// Sample an input (or output) pin.
    fn read(&self, physical_id: u32) -> Result<Level, HardwareError>;

    /// Register `handler` to run on every falling edge of `physical_id`.
    fn watch_falling_edge(
        &self,
        physical_id: u32,
        handler: EdgeHandler,
    ) -> Result<Box<dyn EdgeWatch>, HardwareError>;

    /// Release all claimed pins.
    fn release(&self) {}
}

/// Time source.
///
/// Provides monotonic time in milliseconds for debounce windows and the
/// optional max-on-time cutoff.
///
/// # Example
///
/// ```rust
/// use prl_launcher::traits::Clock;
/// use prl_launcher::hal::MockClock;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance(100);
/// assert_eq!(clock.now_ms(), 100);
/// ```
pub trait Clock: Send + Sync + 'static {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}

/// Blocking delay.
///
/// The launch pulse and the limit reversal are fixed blocking waits; routing
/// them through this trait lets tests run them in virtual time.
pub trait Delay: Send + Sync + 'static {
    /// Block the calling thread for `ms` milliseconds.
    fn delay_ms(&self, ms: u64);
}

/// A clock that can also wait. Implemented for every `Clock + Delay`.
pub trait Timebase: Clock + Delay {}

impl<T: Clock + Delay> Timebase for T {}
