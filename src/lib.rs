//! # prl-launcher
//!
//! Motion-and-launch control core of a remotely operated pan/tilt rocket
//! launcher rig.
//!
//! ## Features
//!
//! - **Relay outputs**: launch relays (one per tube) and four motor relays,
//!   every transition logged and kept in an audit trail
//! - **Motion interlocks**: never both directions of an axis, opposite
//!   direction cancelled on start, no start into an asserted limit switch
//! - **Limit monitor**: background loop that stops and briefly reverses a
//!   direction on limit contact, with an optional maximum on-time
//! - **Encoders**: two debounced quadrature counters driven by edge callbacks
//! - **Emergency stop**: always accepted, wins over an in-flight reversal
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - GPIO, clock and delay abstractions plus the axis vocabulary
//! - `pins` - Logical pin map and its validation
//! - `output` - Relay writes with audit records
//! - `motion` / `limit` / `encoder` / `launch` - The control components
//! - `launcher` - The command facade and background task guard
//! - `hal` - Concrete implementations (mock for testing, sysfs for the rig)
//! - `services` - Arming bookkeeping and the HTTP API (feature `web`)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prl_launcher::hal::{MockClock, MockGpio};
//! use prl_launcher::{AxisDirection, Config, Launcher, Level, MoveRequest};
//!
//! let gpio = Arc::new(MockGpio::new());
//! let clock = Arc::new(MockClock::new());
//! let launcher = Launcher::new(&Config::default(), Arc::clone(&gpio), Arc::clone(&clock)).unwrap();
//!
//! // Tilt up until the upper limit switch closes
//! launcher.move_start(&MoveRequest::from(AxisDirection::Up)).unwrap();
//! gpio.set_input(15, Level::High);
//! launcher.monitor().tick();
//!
//! // Stopped and backed off for 200 ms
//! assert!(!launcher.query_motion_state().any());
//! assert_eq!(clock.delays(), vec![200]);
//!
//! // Fire tubes 3 and 5 together
//! launcher.launch(&[3, 5]).unwrap();
//! ```

#![warn(missing_docs)]

/// Launcher configuration loaded from TOML.
pub mod config;
/// Quadrature encoder tracking.
pub mod encoder;
/// Error types.
pub mod error;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Tube firing and relay bench test.
pub mod launch;
/// Command facade and background task guard.
pub mod launcher;
/// Limit switch monitoring loop.
pub mod limit;
/// Motion flag arbitration.
pub mod motion;
/// Relay output driver with audit trail.
pub mod output;
/// Logical pin map.
pub mod pins;
/// Core traits for hardware abstraction.
pub mod traits;

/// Arming bookkeeping and HTTP API (feature-gated).
#[cfg(feature = "web")]
pub mod services;

// Re-exports for convenience
pub use config::{Config, ConfigError, TimingConfig, WebConfig};
pub use encoder::{EdgeOutcome, EncoderCounts, EncoderState, RotaryEncoderTracker};
pub use error::{HardwareError, LauncherError, Result};
pub use launch::LaunchSequencer;
pub use launcher::{BackgroundTasks, Launcher};
pub use limit::{LimitEvent, LimitSwitchMonitor, ShutdownSignal, TickReport};
pub use motion::{
    MotionController, MotionSnapshot, MoveAction, MoveRequest, ReversalStart, ReversalToken,
    StartOutcome,
};
pub use output::{AuditEntry, OutputDriver};
pub use pins::{LogicalPin, PinDirection, PinRegistry, Pull};
pub use traits::{Axis, AxisDirection, Clock, Delay, GpioBackend, Level, Timebase};
