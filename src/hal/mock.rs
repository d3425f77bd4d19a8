//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for the hardware traits, enabling
//! development and testing on desktop without the rig.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockGpio`] | [`GpioBackend`] | Records writes, settable inputs, manual edges, injected faults |
//! | [`MockClock`] | [`Clock`] + [`Delay`] | Virtual time; delays advance it and run an optional hook |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prl_launcher::hal::{MockClock, MockGpio};
//! use prl_launcher::{AxisDirection, Config, Launcher, Level, MoveRequest};
//!
//! let gpio = Arc::new(MockGpio::new());
//! let clock = Arc::new(MockClock::new());
//! let launcher = Launcher::new(&Config::default(), Arc::clone(&gpio), clock).unwrap();
//! gpio.clear_writes();
//!
//! launcher.move_start(&MoveRequest::from(AxisDirection::Up)).unwrap();
//! assert!(launcher.query_motion_state().up);
//! assert_eq!(gpio.writes(), vec![(25, Level::High)]);
//! ```
//!
//! [`GpioBackend`]: crate::traits::GpioBackend
//! [`Clock`]: crate::traits::Clock
//! [`Delay`]: crate::traits::Delay

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::HardwareError;
use crate::pins::LogicalPin;
use crate::traits::{Clock, Delay, EdgeHandler, EdgeWatch, GpioBackend, Level};

// ============================================================================
// GPIO Mock
// ============================================================================

type SharedHandler = Arc<Mutex<EdgeHandler>>;

#[derive(Default)]
struct GpioState {
    writes: Vec<(u32, Level)>,
    levels: HashMap<u32, Level>,
    configured: Vec<u32>,
    watchers: HashMap<u32, (u64, SharedHandler)>,
    next_watch: u64,
    failing_writes: HashSet<u32>,
    failing_reads: HashSet<u32>,
    /// Pins given up by `release` and not configured since.
    unexported: HashSet<u32>,
    released: bool,
}

/// Mock GPIO backend for testing.
///
/// Records every write in order, returns the last written level (or the
/// level set with [`set_input`](Self::set_input)) on reads, and lets tests
/// fire falling edges by hand.
///
/// # Example
///
/// ```rust
/// use prl_launcher::hal::MockGpio;
/// use prl_launcher::traits::{GpioBackend, Level};
///
/// let gpio = MockGpio::new();
/// gpio.write(24, Level::High).unwrap();
/// gpio.write(24, Level::Low).unwrap();
/// assert_eq!(gpio.writes_to(24), vec![Level::High, Level::Low]);
///
/// gpio.fail_writes_to(24);
/// assert!(gpio.write(24, Level::High).is_err());
/// ```
#[derive(Clone, Default)]
pub struct MockGpio {
    state: Arc<Mutex<GpioState>>,
}

impl MockGpio {
    /// Creates a mock with every pin low and nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GpioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All successful writes, oldest first.
    pub fn writes(&self) -> Vec<(u32, Level)> {
        self.lock().writes.clone()
    }

    /// Successful writes to one pin, oldest first.
    pub fn writes_to(&self, physical_id: u32) -> Vec<Level> {
        self.lock()
            .writes
            .iter()
            .filter(|(id, _)| *id == physical_id)
            .map(|(_, level)| *level)
            .collect()
    }

    /// Forget recorded writes (levels are kept).
    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Current level of a pin (last write or injected input).
    pub fn level(&self, physical_id: u32) -> Level {
        self.lock()
            .levels
            .get(&physical_id)
            .copied()
            .unwrap_or_default()
    }

    /// Set the level an input will read.
    pub fn set_input(&self, physical_id: u32, level: Level) {
        self.lock().levels.insert(physical_id, level);
    }

    /// Make every subsequent write to `physical_id` fail.
    pub fn fail_writes_to(&self, physical_id: u32) {
        self.lock().failing_writes.insert(physical_id);
    }

    /// Make every subsequent read of `physical_id` fail.
    pub fn fail_reads_from(&self, physical_id: u32) {
        self.lock().failing_reads.insert(physical_id);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_writes.clear();
        state.failing_reads.clear();
    }

    /// Pins passed to `configure`, in order.
    pub fn configured(&self) -> Vec<u32> {
        self.lock().configured.clone()
    }

    /// Whether a falling-edge callback is registered on `physical_id`.
    pub fn is_watching(&self, physical_id: u32) -> bool {
        self.lock().watchers.contains_key(&physical_id)
    }

    /// Whether `release` was called with no `configure` since.
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Simulate a falling edge: drive the pin low and run its callback.
    ///
    /// Returns `false` if no callback is registered.
    pub fn fire_falling_edge(&self, physical_id: u32) -> bool {
        let handler = {
            let mut state = self.lock();
            state.levels.insert(physical_id, Level::Low);
            match state.watchers.get(&physical_id) {
                Some((_, handler)) => Arc::clone(handler),
                None => return false,
            }
        };
        // Callbacks read pins back, so the state lock must be released first.
        let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
        (*handler)();
        true
    }
}

impl GpioBackend for MockGpio {
    fn configure(&self, pin: &LogicalPin) -> Result<(), HardwareError> {
        let mut state = self.lock();
        state.configured.push(pin.physical_id);
        state.unexported.remove(&pin.physical_id);
        state.released = false;
        if pin.is_output() {
            state.levels.insert(pin.physical_id, Level::Low);
        }
        Ok(())
    }

    fn write(&self, physical_id: u32, level: Level) -> Result<(), HardwareError> {
        let mut state = self.lock();
        if state.unexported.contains(&physical_id) {
            return Err(HardwareError::new(physical_id, "pin not configured"));
        }
        if state.failing_writes.contains(&physical_id) {
            return Err(HardwareError::new(physical_id, "injected write failure"));
        }
        state.levels.insert(physical_id, level);
        state.writes.push((physical_id, level));
        Ok(())
    }

    fn read(&self, physical_id: u32) -> Result<Level, HardwareError> {
        let state = self.lock();
        if state.unexported.contains(&physical_id) {
            return Err(HardwareError::new(physical_id, "pin not configured"));
        }
        if state.failing_reads.contains(&physical_id) {
            return Err(HardwareError::new(physical_id, "injected read failure"));
        }
        Ok(state
            .levels
            .get(&physical_id)
            .copied()
            .unwrap_or_default())
    }

    fn watch_falling_edge(
        &self,
        physical_id: u32,
        handler: EdgeHandler,
    ) -> Result<Box<dyn EdgeWatch>, HardwareError> {
        let mut state = self.lock();
        if state.watchers.contains_key(&physical_id) {
            return Err(HardwareError::new(physical_id, "edge callback already registered"));
        }
        state.next_watch += 1;
        let id = state.next_watch;
        state
            .watchers
            .insert(physical_id, (id, Arc::new(Mutex::new(handler))));
        Ok(Box::new(MockEdgeWatch {
            state: Arc::clone(&self.state),
            physical_id,
            id,
        }))
    }

    fn release(&self) {
        let mut state = self.lock();
        let pins = state.configured.clone();
        state.unexported.extend(pins);
        state.released = true;
    }
}

struct MockEdgeWatch {
    state: Arc<Mutex<GpioState>>,
    physical_id: u32,
    id: u64,
}

impl EdgeWatch for MockEdgeWatch {
    fn cancel(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(state.watchers.get(&self.physical_id), Some((id, _)) if *id == self.id) {
            state.watchers.remove(&self.physical_id);
        }
    }
}

// ============================================================================
// Clock Mock
// ============================================================================

type DelayHook = Box<dyn FnMut(u64) + Send>;

/// Mock clock for testing.
///
/// Provides a controllable time source. [`Delay::delay_ms`] returns
/// immediately after advancing virtual time, recording the request and
/// running the hook installed with [`on_delay`](Self::on_delay).
///
/// # Example
///
/// ```rust
/// use prl_launcher::hal::MockClock;
/// use prl_launcher::traits::{Clock, Delay};
///
/// let clock = MockClock::new();
/// clock.set(1000);
/// clock.delay_ms(200);
/// assert_eq!(clock.now_ms(), 1200);
/// assert_eq!(clock.delays(), vec![200]);
/// ```
#[derive(Default)]
pub struct MockClock {
    current_ms: AtomicU64,
    delays: Mutex<Vec<u64>>,
    hook: Mutex<Option<DelayHook>>,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time in milliseconds.
    pub fn set(&self, ms: u64) {
        self.current_ms.store(ms, Ordering::SeqCst);
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, ms: u64) {
        self.current_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Every delay requested so far, oldest first.
    pub fn delays(&self) -> Vec<u64> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `hook` with the requested duration after every delay.
    pub fn on_delay(&self, hook: impl FnMut(u64) + Send + 'static) {
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Remove the delay hook.
    pub fn clear_hook(&self) {
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }
}

impl Delay for MockClock {
    fn delay_ms(&self, ms: u64) {
        self.advance(ms);
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ms);

        // Taken out while running so the hook may call back into the clock.
        let hook = self.hook.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut hook) = hook {
            hook(ms);
            let mut slot = self.hook.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(hook);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
