//! Quadrature rotary encoder tracking (KY-040 style).
//!
//! Each tracker watches the falling edge of its axis clock pin. On an edge
//! outside the debounce window it re-checks that the clock really reads low,
//! then samples the data pin: high counts one step up, low one step down.
//!
//! Every edge that clears the debounce window restarts it, counted or not
//! (spurious and failed reads included). Edges swallowed by the window do not
//! extend it.
//!
//! The tracker is the only writer of its counter. The registered callback
//! holds a weak reference, so dropping the last `Arc` to a tracker does not
//! leak through the backend.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::pins::LogicalPin;
use crate::traits::{Axis, EdgeWatch, GpioBackend, Level, Timebase};

/// Counter snapshot for one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderState {
    /// Axis the encoder is mounted on.
    pub axis: Axis,
    /// Signed step count since startup.
    pub turn_count: i64,
    /// Clock level seen at the last edge.
    pub last_clock_level: bool,
}

/// Both counters, as returned by the query API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCounts {
    /// Tilt encoder count.
    pub vertical: i64,
    /// Pan encoder count.
    pub horizontal: i64,
}

/// What a single falling edge did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// Data high: count incremented.
    Incremented,
    /// Data low: count decremented.
    Decremented,
    /// Within the debounce window of the previous accepted edge.
    Debounced,
    /// Clock read back high; not a real edge.
    Spurious,
    /// A pin read failed; count unchanged.
    ReadFailed,
}

#[derive(Debug, Default)]
struct Counter {
    turn_count: i64,
    last_clock_level: bool,
    /// Last edge that cleared the debounce window.
    last_edge_ms: Option<u64>,
}

/// Tracks one axis encoder.
pub struct RotaryEncoderTracker<G: GpioBackend, T: Timebase> {
    axis: Axis,
    clock_pin: LogicalPin,
    data_pin: LogicalPin,
    gpio: Arc<G>,
    time: Arc<T>,
    debounce_ms: u64,
    counter: Mutex<Counter>,
    watch: Mutex<Option<Box<dyn EdgeWatch>>>,
}

impl<G: GpioBackend, T: Timebase> RotaryEncoderTracker<G, T> {
    /// Creates a stopped tracker with a zero count.
    pub fn new(
        axis: Axis,
        clock_pin: LogicalPin,
        data_pin: LogicalPin,
        gpio: Arc<G>,
        time: Arc<T>,
        debounce_ms: u64,
    ) -> Self {
        Self {
            axis,
            clock_pin,
            data_pin,
            gpio,
            time,
            debounce_ms,
            counter: Mutex::new(Counter::default()),
            watch: Mutex::new(None),
        }
    }

    fn counter(&self) -> MutexGuard<'_, Counter> {
        self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watch(&self) -> MutexGuard<'_, Option<Box<dyn EdgeWatch>>> {
        self.watch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the falling-edge callback. Does nothing if already running.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut watch = self.watch();
        if watch.is_some() {
            return Ok(());
        }
        let tracker = Arc::downgrade(self);
        let handle = self.gpio.watch_falling_edge(
            self.clock_pin.physical_id,
            Box::new(move || {
                if let Some(tracker) = tracker.upgrade() {
                    tracker.on_falling_edge();
                }
            }),
        )?;
        *watch = Some(handle);
        debug!(axis = %self.axis, clock = self.clock_pin.physical_id, "encoder started");
        Ok(())
    }

    /// Deregisters the callback. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        if let Some(mut handle) = self.watch().take() {
            handle.cancel();
            debug!(axis = %self.axis, "encoder stopped");
        }
    }

    /// Whether the callback is registered.
    pub fn is_running(&self) -> bool {
        self.watch().is_some()
    }

    /// Handles one falling edge of the clock pin.
    pub fn on_falling_edge(&self) -> EdgeOutcome {
        let now = self.time.now_ms();
        let mut counter = self.counter();

        if let Some(last) = counter.last_edge_ms {
            if now.saturating_sub(last) < self.debounce_ms {
                trace!(axis = %self.axis, "edge debounced");
                return EdgeOutcome::Debounced;
            }
        }
        counter.last_edge_ms = Some(now);

        let clock = match self.gpio.read(self.clock_pin.physical_id) {
            Ok(level) => level,
            Err(err) => {
                warn!(axis = %self.axis, error = %err, "encoder clock read failed");
                return EdgeOutcome::ReadFailed;
            }
        };
        counter.last_clock_level = clock.is_high();
        if clock == Level::High {
            return EdgeOutcome::Spurious;
        }

        let data = match self.gpio.read(self.data_pin.physical_id) {
            Ok(level) => level,
            Err(err) => {
                warn!(axis = %self.axis, error = %err, "encoder data read failed");
                return EdgeOutcome::ReadFailed;
            }
        };

        let outcome = if data.is_high() {
            counter.turn_count += 1;
            EdgeOutcome::Incremented
        } else {
            counter.turn_count -= 1;
            EdgeOutcome::Decremented
        };
        debug!(axis = %self.axis, count = counter.turn_count, "encoder step");
        outcome
    }

    /// Signed step count.
    pub fn turn_count(&self) -> i64 {
        self.counter().turn_count
    }

    /// Full state snapshot.
    pub fn state(&self) -> EncoderState {
        let counter = self.counter();
        EncoderState {
            axis: self.axis,
            turn_count: counter.turn_count,
            last_clock_level: counter.last_clock_level,
        }
    }

    /// Axis this tracker counts.
    pub fn axis(&self) -> Axis {
        self.axis
    }
}
