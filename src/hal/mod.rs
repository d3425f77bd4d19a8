//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`] for various platforms.
//!
//! # Available Implementations
//!
//! - `mock`: Test implementations for desktop development
//! - `system`: Wall-clock [`Clock`](crate::traits::Clock) and
//!   [`Delay`](crate::traits::Delay)
//! - `sysfs`: Raspberry Pi GPIO through Linux sysfs (requires `sysfs` feature)

pub mod mock;
pub mod system;

#[cfg(feature = "sysfs")]
pub mod sysfs;

pub use mock::*;
pub use system::*;

#[cfg(feature = "sysfs")]
pub use sysfs::*;
