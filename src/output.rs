//! Relay output driver with an in-memory audit trail.
//!
//! Every relay write goes through [`OutputDriver`]: the backend is written
//! first, then a `tracing` event is emitted and an [`AuditEntry`] appended to
//! a bounded history. Failed writes leave no audit record.

use std::sync::{Arc, Mutex, PoisonError};

use heapless::HistoryBuffer;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{HardwareError, LauncherError, Result};
use crate::pins::{LogicalPin, PinRegistry};
use crate::traits::{GpioBackend, Level, Timebase};

/// Number of transitions kept by the audit trail.
pub const AUDIT_CAPACITY: usize = 128;

/// One recorded pin transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    /// Logical pin name.
    pub pin: String,
    /// Physical pin id.
    pub physical_id: u32,
    /// Level written.
    pub level: Level,
    /// Clock reading at the write.
    pub timestamp_ms: u64,
}

/// Drives output pins and records every transition.
///
/// Shared by the motion controller, the limit monitor and the launch
/// sequencer; all methods take `&self`.
pub struct OutputDriver<G: GpioBackend, T: Timebase> {
    gpio: Arc<G>,
    registry: Arc<PinRegistry>,
    time: Arc<T>,
    audit: Mutex<HistoryBuffer<AuditEntry, AUDIT_CAPACITY>>,
}

impl<G: GpioBackend, T: Timebase> OutputDriver<G, T> {
    /// Creates a driver. Call [`init`](Self::init) before the first write.
    pub fn new(gpio: Arc<G>, registry: Arc<PinRegistry>, time: Arc<T>) -> Self {
        Self {
            gpio,
            registry,
            time,
            audit: Mutex::new(HistoryBuffer::new()),
        }
    }

    /// Configures every registered pin and drives all outputs low.
    pub fn init(&self) -> Result<()> {
        for pin in self.registry.pins() {
            self.gpio.configure(pin)?;
        }
        for pin in self.registry.outputs() {
            self.write_pin(pin, Level::Low)?;
        }
        debug!(
            outputs = self.registry.outputs().count(),
            inputs = self.registry.inputs().count(),
            "pins configured"
        );
        Ok(())
    }

    /// Drives the named output high.
    pub fn set_high(&self, name: &str) -> Result<()> {
        self.set_level(name, Level::High)
    }

    /// Drives the named output low.
    pub fn set_low(&self, name: &str) -> Result<()> {
        self.set_level(name, Level::Low)
    }

    /// Drives the named output to `level`.
    ///
    /// # Errors
    ///
    /// [`LauncherError::Configuration`] if `name` is not a registered output,
    /// [`LauncherError::Hardware`] if the backend write fails.
    pub fn set_level(&self, name: &str, level: Level) -> Result<()> {
        let pin = self.registry.output(name)?;
        self.write_pin(pin, level)
    }

    pub(crate) fn write_pin(&self, pin: &LogicalPin, level: Level) -> Result<()> {
        if !pin.is_output() {
            return Err(LauncherError::config(format!(
                "pin '{}' is not registered as an output",
                pin.name
            )));
        }
        self.gpio.write(pin.physical_id, level)?;

        let timestamp_ms = self.time.now_ms();
        info!(pin = %pin.name, physical_id = pin.physical_id, %level, "pin {} {}", pin.physical_id, level);
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(AuditEntry {
                pin: pin.name.clone(),
                physical_id: pin.physical_id,
                level,
                timestamp_ms,
            });
        Ok(())
    }

    /// Samples an input pin.
    pub fn read_input(&self, pin: &LogicalPin) -> core::result::Result<Level, HardwareError> {
        self.gpio.read(pin.physical_id)
    }

    /// Drives every output low, attempting all of them.
    ///
    /// Returns the first failure, if any.
    pub fn force_all_low(&self) -> Result<()> {
        let mut first = None;
        for pin in self.registry.outputs() {
            if let Err(err) = self.write_pin(pin, Level::Low) {
                warn!(pin = %pin.name, error = %err, "failed to force output low");
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Recorded transitions, oldest first.
    pub fn audit_trail(&self) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .oldest_ordered()
            .cloned()
            .collect()
    }

    /// The pin map.
    pub fn registry(&self) -> &Arc<PinRegistry> {
        &self.registry
    }

    /// The GPIO backend.
    pub fn gpio(&self) -> &Arc<G> {
        &self.gpio
    }

    /// The time source.
    pub fn time(&self) -> &Arc<T> {
        &self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockClock, MockGpio};
    use crate::pins::{names, reference_rig};

    fn driver() -> (Arc<MockGpio>, Arc<MockClock>, OutputDriver<MockGpio, MockClock>) {
        let gpio = Arc::new(MockGpio::new());
        let clock = Arc::new(MockClock::new());
        let registry = Arc::new(PinRegistry::new(reference_rig()).unwrap());
        let driver = OutputDriver::new(Arc::clone(&gpio), registry, Arc::clone(&clock));
        (gpio, clock, driver)
    }

    #[test]
    fn init_configures_and_lowers_outputs() {
        let (gpio, _, driver) = driver();
        driver.init().unwrap();
        assert_eq!(gpio.configured().len(), 26);
        assert_eq!(gpio.writes().len(), 18);
        assert!(gpio.writes().iter().all(|(_, level)| *level == Level::Low));
    }

    #[test]
    fn set_high_and_low() {
        let (gpio, _, driver) = driver();
        driver.set_high(names::MOVE_OUTPUT_CW).unwrap();
        driver.set_low(names::MOVE_OUTPUT_CW).unwrap();
        assert_eq!(gpio.writes_to(24), vec![Level::High, Level::Low]);
    }

    #[test]
    fn inputs_are_not_writable() {
        let (gpio, _, driver) = driver();
        let err = driver.set_high(names::LIMIT_UP).unwrap_err();
        assert!(matches!(err, LauncherError::Configuration(_)));
        let err = driver.set_low("launch_42").unwrap_err();
        assert!(matches!(err, LauncherError::Configuration(_)));

        let limit = driver.registry().limit_switch(crate::AxisDirection::Up).clone();
        assert!(driver.write_pin(&limit, Level::High).is_err());
        assert!(gpio.writes().is_empty());
    }

    #[test]
    fn audit_records_transitions() {
        let (_, clock, driver) = driver();
        clock.set(500);
        driver.set_high("launch_1").unwrap();
        clock.advance(1500);
        driver.set_low("launch_1").unwrap();

        let trail = driver.audit_trail();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].pin, "launch_1");
        assert_eq!(trail[0].physical_id, 8);
        assert_eq!(trail[0].level, Level::High);
        assert_eq!(trail[0].timestamp_ms, 500);
        assert_eq!(trail[1].level, Level::Low);
        assert_eq!(trail[1].timestamp_ms, 2000);
    }

    #[test]
    fn audit_is_bounded() {
        let (_, _, driver) = driver();
        for _ in 0..(AUDIT_CAPACITY + 10) {
            driver.set_low("launch_2").unwrap();
        }
        assert_eq!(driver.audit_trail().len(), AUDIT_CAPACITY);
    }

    #[test]
    fn failed_write_is_not_audited() {
        let (gpio, _, driver) = driver();
        gpio.fail_writes_to(8);
        let err = driver.set_high("launch_1").unwrap_err();
        assert!(matches!(err, LauncherError::Hardware(_)));
        assert!(driver.audit_trail().is_empty());
    }

    #[test]
    fn force_all_low_attempts_every_output() {
        let (gpio, _, driver) = driver();
        gpio.fail_writes_to(25);
        assert!(driver.force_all_low().is_err());
        assert_eq!(gpio.writes().len(), 17);
    }
}
