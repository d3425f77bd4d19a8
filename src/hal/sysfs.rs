//! Linux sysfs GPIO backend (Raspberry Pi).
//!
//! Pins are exported on [`configure`](GpioBackend::configure) and unexported
//! on [`release`](GpioBackend::release). Falling edges are delivered by one
//! poller thread per watched pin.
//!
//! sysfs cannot set pull resistors; inputs that need a pull-down must get it
//! from the device tree or external wiring.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use sysfs_gpio::{Direction, Edge, Pin};
use tracing::{debug, warn};

use crate::error::HardwareError;
use crate::pins::{LogicalPin, PinDirection, Pull};
use crate::traits::{EdgeHandler, EdgeWatch, GpioBackend, Level};

/// Poll timeout of the edge threads; bounds how long `cancel` waits.
const EDGE_POLL_MS: isize = 50;

fn hw(physical_id: u32) -> impl Fn(sysfs_gpio::Error) -> HardwareError {
    move |err| HardwareError::new(physical_id, err.to_string())
}

/// GPIO through `/sys/class/gpio`.
#[derive(Default)]
pub struct SysfsGpio {
    pins: Mutex<HashMap<u32, Pin>>,
}

impl SysfsGpio {
    /// Creates a backend with no pins claimed.
    pub fn new() -> Self {
        Self::default()
    }

    fn pins(&self) -> MutexGuard<'_, HashMap<u32, Pin>> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pin(&self, physical_id: u32) -> Result<Pin, HardwareError> {
        self.pins()
            .get(&physical_id)
            .copied()
            .ok_or_else(|| HardwareError::new(physical_id, "pin not configured"))
    }
}

impl GpioBackend for SysfsGpio {
    fn configure(&self, pin: &LogicalPin) -> Result<(), HardwareError> {
        let id = pin.physical_id;
        let handle = Pin::new(u64::from(id));
        handle.export().map_err(hw(id))?;
        match pin.direction {
            PinDirection::Output => {
                // Start low so no relay clicks during startup.
                handle.set_direction(Direction::Low).map_err(hw(id))?;
            }
            PinDirection::Input => {
                handle.set_direction(Direction::In).map_err(hw(id))?;
                if pin.pull == Pull::PullDown {
                    warn!(pin = %pin.name, physical_id = id, "sysfs cannot configure pull-down");
                }
            }
        }
        self.pins().insert(id, handle);
        debug!(pin = %pin.name, physical_id = id, "exported");
        Ok(())
    }

    fn write(&self, physical_id: u32, level: Level) -> Result<(), HardwareError> {
        self.pin(physical_id)?
            .set_value(level.as_bit())
            .map_err(hw(physical_id))
    }

    fn read(&self, physical_id: u32) -> Result<Level, HardwareError> {
        self.pin(physical_id)?
            .get_value()
            .map(Level::from_bit)
            .map_err(hw(physical_id))
    }

    fn watch_falling_edge(
        &self,
        physical_id: u32,
        mut handler: EdgeHandler,
    ) -> Result<Box<dyn EdgeWatch>, HardwareError> {
        let pin = self.pin(physical_id)?;
        pin.set_edge(Edge::FallingEdge).map_err(hw(physical_id))?;
        let mut poller = pin.get_poller().map_err(hw(physical_id))?;

        let stop = Arc::new(AtomicBool::new(false));
        let stopped = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("gpio{physical_id}-edge"))
            .spawn(move || {
                while !stopped.load(Ordering::SeqCst) {
                    match poller.poll(EDGE_POLL_MS) {
                        Ok(Some(_)) => handler(),
                        Ok(None) => {}
                        Err(err) => {
                            warn!(physical_id, error = %err, "edge poll failed");
                            break;
                        }
                    }
                }
            })
            .map_err(|err| HardwareError::new(physical_id, err.to_string()))?;

        Ok(Box::new(SysfsEdgeWatch {
            physical_id,
            stop,
            thread: Some(thread),
        }))
    }

    fn release(&self) {
        for (id, pin) in self.pins().drain() {
            if let Err(err) = pin.unexport() {
                warn!(physical_id = id, error = %err, "unexport failed");
            }
        }
    }
}

struct SysfsEdgeWatch {
    physical_id: u32,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EdgeWatch for SysfsEdgeWatch {
    fn cancel(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(physical_id = self.physical_id, "edge thread panicked");
            }
        }
    }
}

impl Drop for SysfsEdgeWatch {
    fn drop(&mut self) {
        // Detach rather than join: drop may run on the edge thread itself.
        self.stop.store(true, Ordering::SeqCst);
    }
}
