//! Error types for the launcher core.
//!
//! | Error | Recoverable | Side effects |
//! |-------|-------------|--------------|
//! | [`LauncherError::Configuration`] | no, halts startup | none |
//! | [`LauncherError::ConflictingDirections`] | yes | none, rejected before any write |
//! | [`LauncherError::UnknownTubeId`] | yes | none, rejected before any write |
//! | [`LauncherError::EmptyLaunchRequest`] | yes | none |
//! | [`LauncherError::TubeBusy`] | yes | none |
//! | [`LauncherError::Hardware`] | no, aborts the command | partial, never retried |

use thiserror::Error;

use crate::traits::Axis;

/// A GPIO backend failed to read, write or watch a pin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("GPIO {physical_id}: {message}")]
pub struct HardwareError {
    /// Physical pin the operation targeted.
    pub physical_id: u32,
    /// Backend-specific description.
    pub message: String,
}

impl HardwareError {
    /// Creates a hardware error for `physical_id`.
    pub fn new(physical_id: u32, message: impl Into<String>) -> Self {
        Self {
            physical_id,
            message: message.into(),
        }
    }
}

/// Errors returned by launcher commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LauncherError {
    /// Pin misuse or invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A movement command named both directions of one axis.
    #[error("conflicting directions requested on the {axis} axis")]
    ConflictingDirections {
        /// Axis with both directions set.
        axis: Axis,
    },

    /// No launch relay is registered for this tube.
    #[error("unknown tube id {0}")]
    UnknownTubeId(u32),

    /// A launch request without any tube ids.
    #[error("launch request names no tubes")]
    EmptyLaunchRequest,

    /// Another launch is currently driving this tube's relay.
    #[error("tube {0} is already firing")]
    TubeBusy(u32),

    /// Hardware write/read failure.
    #[error("hardware fault: {0}")]
    Hardware(#[from] HardwareError),
}

impl LauncherError {
    /// Shorthand for [`LauncherError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        LauncherError::Configuration(message.into())
    }

    /// Returns `true` for errors that reject a command without touching hardware.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LauncherError::ConflictingDirections { .. }
                | LauncherError::UnknownTubeId(_)
                | LauncherError::EmptyLaunchRequest
                | LauncherError::TubeBusy(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = LauncherError> = core::result::Result<T, E>;
