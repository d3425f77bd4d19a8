//! Shared state for the request layer.
//!
//! `SharedLauncher` pairs the [`Launcher`] with the arming bookkeeping so every
//! request handler works against one instance.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prl_launcher::hal::{MockClock, MockGpio};
//! use prl_launcher::services::{CommandError, SharedLauncher};
//! use prl_launcher::{Config, Launcher};
//!
//! let launcher = Launcher::new(&Config::default(), Arc::new(MockGpio::new()), Arc::new(MockClock::new())).unwrap();
//! let state = Arc::new(SharedLauncher::new(launcher, "PRL2016"));
//!
//! assert_eq!(state.fire(&[1]), Err(CommandError::NotArmed));
//! state.arm();
//! assert_eq!(state.fire(&[1]).unwrap(), vec![1]);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::info;

use crate::error::LauncherError;
use crate::launcher::Launcher;
use crate::traits::{GpioBackend, Timebase};

use super::arming::LaunchingSystem;

/// Failure of a request-layer command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Launch refused: the system is disarmed.
    #[error("System is not armed!")]
    NotArmed,
    /// Rejected or failed by the control core.
    #[error(transparent)]
    Launcher(#[from] LauncherError),
}

/// Launcher plus arming state, shared by all handlers.
pub struct SharedLauncher<G: GpioBackend, T: Timebase> {
    launcher: Launcher<G, T>,
    system: Mutex<LaunchingSystem>,
    name: String,
}

impl<G: GpioBackend, T: Timebase> SharedLauncher<G, T> {
    /// Wraps `launcher`, disarmed, with one empty tube per launch relay.
    pub fn new(launcher: Launcher<G, T>, name: impl Into<String>) -> Self {
        let system = LaunchingSystem::new(launcher.tube_ids());
        Self {
            launcher,
            system: Mutex::new(system),
            name: name.into(),
        }
    }

    /// The control core.
    pub fn launcher(&self) -> &Launcher<G, T> {
        &self.launcher
    }

    /// Device name, served by the index route.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn system(&self) -> MutexGuard<'_, LaunchingSystem> {
        self.system.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Access the arming state with a lock held.
    ///
    /// Never call launcher commands from inside the closure.
    pub fn with_system<R>(&self, f: impl FnOnce(&mut LaunchingSystem) -> R) -> R {
        f(&mut self.system())
    }

    /// Copy of the arming state.
    pub fn status(&self) -> LaunchingSystem {
        self.system().clone()
    }

    /// Arm the system
    pub fn arm(&self) {
        self.system().arm();
        info!("system armed");
    }

    /// Disarm the system
    pub fn disarm(&self) {
        self.system().disarm();
        info!("system disarmed");
    }

    /// Marks tubes loaded.
    pub fn load(&self, tube_ids: &[u32]) -> Result<(), CommandError> {
        Ok(self.system().load(tube_ids)?)
    }

    /// Fires the given tubes if armed. Blocks for the launch duration.
    pub fn fire(&self, tube_ids: &[u32]) -> Result<Vec<u32>, CommandError> {
        self.ensure_armed()?;
        let fired = self.launcher.launch(tube_ids)?;
        self.system().mark_fired(&fired);
        Ok(fired)
    }

    /// Fires every tube if armed. Blocks for the launch duration.
    pub fn fire_all(&self) -> Result<Vec<u32>, CommandError> {
        self.ensure_armed()?;
        let fired = self.launcher.launch_all()?;
        self.system().mark_fired(&fired);
        Ok(fired)
    }

    fn ensure_armed(&self) -> Result<(), CommandError> {
        if self.system().armed {
            Ok(())
        } else {
            Err(CommandError::NotArmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockClock, MockGpio};
    use crate::Config;
    use std::sync::Arc;

    fn shared() -> (Arc<MockGpio>, SharedLauncher<MockGpio, MockClock>) {
        let gpio = Arc::new(MockGpio::new());
        let launcher = Launcher::new(
            &Config::default(),
            Arc::clone(&gpio),
            Arc::new(MockClock::new()),
        )
        .unwrap();
        gpio.clear_writes();
        (gpio, SharedLauncher::new(launcher, "PRL2016"))
    }

    #[test]
    fn tubes_follow_registry() {
        let (_, state) = shared();
        let status = state.status();
        assert!(!status.armed);
        assert_eq!(status.tubes.len(), 14);
        assert_eq!(status.tubes[0].id, 1);
        assert_eq!(state.name(), "PRL2016");
    }

    #[test]
    fn fire_requires_arming() {
        let (gpio, state) = shared();
        assert_eq!(state.fire(&[1]), Err(CommandError::NotArmed));
        assert_eq!(state.fire_all(), Err(CommandError::NotArmed));
        assert!(gpio.writes().is_empty());
    }

    #[test]
    fn fired_tubes_are_unloaded() {
        let (_, state) = shared();
        state.load(&[2, 3]).unwrap();
        state.arm();
        assert_eq!(state.fire(&[2]).unwrap(), vec![2]);

        let status = state.status();
        assert!(!status.tubes[1].loaded);
        assert!(status.tubes[2].loaded);
    }

    #[test]
    fn core_rejections_pass_through() {
        let (_, state) = shared();
        state.arm();
        assert_eq!(
            state.fire(&[40]),
            Err(CommandError::Launcher(LauncherError::UnknownTubeId(40)))
        );
        assert_eq!(
            state.load(&[40]),
            Err(CommandError::Launcher(LauncherError::UnknownTubeId(40)))
        );
    }

    #[test]
    fn disarm_blocks_again() {
        let (_, state) = shared();
        state.arm();
        state.disarm();
        assert_eq!(state.fire(&[1]), Err(CommandError::NotArmed));
        state.with_system(|system| system.arm());
        assert!(state.status().armed);
    }
}
