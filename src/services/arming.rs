//! Arming state and tube bookkeeping.
//!
//! The control core only knows tube ids. This layer tracks whether the
//! system is armed (launching is refused otherwise) and which tubes are
//! loaded; a fired tube is marked empty.

use serde::{Deserialize, Serialize};

use crate::error::LauncherError;

/// One launch tube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tube {
    /// Tube id (≥ 1), matches its `launch_<id>` relay.
    pub id: u32,
    /// Whether a rocket is loaded.
    pub loaded: bool,
}

/// Arming flag plus one [`Tube`] per launch relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchingSystem {
    /// Launch commands are refused while false.
    pub armed: bool,
    /// Tubes, ascending by id.
    pub tubes: Vec<Tube>,
}

impl LaunchingSystem {
    /// Creates a disarmed system with every tube empty.
    pub fn new(tube_ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            armed: false,
            tubes: tube_ids
                .into_iter()
                .map(|id| Tube { id, loaded: false })
                .collect(),
        }
    }

    /// Arm the system
    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// Disarm the system
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Looks up a tube.
    pub fn tube(&self, id: u32) -> Option<&Tube> {
        self.tubes.iter().find(|t| t.id == id)
    }

    /// Marks tubes loaded. Unknown ids are rejected before any change.
    pub fn load(&mut self, ids: &[u32]) -> Result<(), LauncherError> {
        if let Some(&unknown) = ids.iter().find(|&&id| self.tube(id).is_none()) {
            return Err(LauncherError::UnknownTubeId(unknown));
        }
        self.set_loaded(ids, true);
        Ok(())
    }

    /// Marks tubes empty after firing.
    pub fn mark_fired(&mut self, ids: &[u32]) {
        self.set_loaded(ids, false);
    }

    fn set_loaded(&mut self, ids: &[u32], loaded: bool) {
        for tube in self.tubes.iter_mut().filter(|t| ids.contains(&t.id)) {
            tube.loaded = loaded;
        }
    }
}
