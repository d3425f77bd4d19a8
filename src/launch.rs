//! Tube firing and the relay bench test.
//!
//! A launch is grouped: every requested relay goes high, one wait of the
//! launch duration, then every relay goes low. Tube ids are resolved before
//! the first write, so an unknown id never fires anything. Tubes currently
//! firing are reserved; a second request naming one of them is rejected.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::error::{LauncherError, Result};
use crate::output::OutputDriver;
use crate::pins::LogicalPin;
use crate::traits::{GpioBackend, Level, Timebase};

/// Fires launch relays.
pub struct LaunchSequencer<G: GpioBackend, T: Timebase> {
    output: Arc<OutputDriver<G, T>>,
    launch_ms: u64,
    test_delay_ms: u64,
    in_flight: Mutex<BTreeSet<u32>>,
}

/// Releases reserved tube ids on every exit path.
struct Reservation<'a> {
    in_flight: &'a Mutex<BTreeSet<u32>>,
    ids: Vec<u32>,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        for id in &self.ids {
            in_flight.remove(id);
        }
    }
}

impl<G: GpioBackend, T: Timebase> LaunchSequencer<G, T> {
    /// Creates a sequencer with the default 1500 ms pulse and 300 ms test delay.
    pub fn new(output: Arc<OutputDriver<G, T>>) -> Self {
        Self {
            output,
            launch_ms: 1500,
            test_delay_ms: 300,
            in_flight: Mutex::new(BTreeSet::new()),
        }
    }

    /// Set the launch pulse duration
    pub fn with_launch_ms(mut self, ms: u64) -> Self {
        self.launch_ms = ms;
        self
    }

    /// Set the per-relay delay of the bench test
    pub fn with_test_delay_ms(mut self, ms: u64) -> Self {
        self.test_delay_ms = ms;
        self
    }

    fn in_flight(&self) -> MutexGuard<'_, BTreeSet<u32>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self, ids: &[u32]) -> Result<Reservation<'_>> {
        let mut in_flight = self.in_flight();
        if let Some(&busy) = ids.iter().find(|id| in_flight.contains(id)) {
            return Err(LauncherError::TubeBusy(busy));
        }
        in_flight.extend(ids.iter().copied());
        Ok(Reservation {
            in_flight: &self.in_flight,
            ids: ids.to_vec(),
        })
    }

    /// Fires the given tubes together.
    ///
    /// Duplicate ids are fired once. Returns the ids fired, in request order.
    ///
    /// # Errors
    ///
    /// - [`LauncherError::EmptyLaunchRequest`] for an empty request
    /// - [`LauncherError::UnknownTubeId`] if any id has no relay (nothing written)
    /// - [`LauncherError::TubeBusy`] if any tube is already firing
    /// - [`LauncherError::Hardware`] if a write fails; every relay of the
    ///   request is then driven low on a best-effort basis
    pub fn launch(&self, tube_ids: &[u32]) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(tube_ids.len());
        for &id in tube_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(LauncherError::EmptyLaunchRequest);
        }

        let registry = self.output.registry();
        let relays = ids
            .iter()
            .map(|&id| {
                registry
                    .tube_relay(id)
                    .ok_or(LauncherError::UnknownTubeId(id))
            })
            .collect::<Result<Vec<_>>>()?;

        let _reservation = self.reserve(&ids)?;
        info!(tubes = ?ids, "firing");
        self.pulse(&relays)?;
        info!(tubes = ?ids, "launch complete");
        Ok(ids)
    }

    /// Fires every registered tube together.
    pub fn launch_all(&self) -> Result<Vec<u32>> {
        let ids: Vec<u32> = self.output.registry().tube_ids().collect();
        self.launch(&ids)
    }

    fn pulse(&self, relays: &[&LogicalPin]) -> Result<()> {
        for relay in relays {
            if let Err(err) = self.output.write_pin(relay, Level::High) {
                warn!(pin = %relay.name, error = %err, "launch aborted, lowering relays");
                let _ = self.all_low(relays);
                return Err(err);
            }
        }
        self.output.time().delay_ms(self.launch_ms);
        self.all_low(relays)
    }

    /// Attempts every relay, returns the first failure.
    fn all_low(&self, relays: &[&LogicalPin]) -> Result<()> {
        let mut first = None;
        for relay in relays {
            if let Err(err) = self.output.write_pin(relay, Level::Low) {
                warn!(pin = %relay.name, error = %err, "failed to lower launch relay");
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Cycles every output relay high then low, one at a time, in pin-map
    /// order.
    pub fn relay_test(&self) -> Result<()> {
        info!(delay_ms = self.test_delay_ms, "relay test");
        for pin in self.output.registry().outputs() {
            self.output.write_pin(pin, Level::High)?;
            self.output.time().delay_ms(self.test_delay_ms);
            self.output.write_pin(pin, Level::Low)?;
        }
        Ok(())
    }

    /// Tube ids currently firing.
    pub fn firing(&self) -> Vec<u32> {
        self.in_flight().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockClock, MockGpio};
    use crate::pins::{reference_rig, PinRegistry};

    fn sequencer() -> (
        Arc<MockGpio>,
        Arc<MockClock>,
        LaunchSequencer<MockGpio, MockClock>,
    ) {
        let gpio = Arc::new(MockGpio::new());
        let clock = Arc::new(MockClock::new());
        let registry = Arc::new(PinRegistry::new(reference_rig()).unwrap());
        let output = Arc::new(OutputDriver::new(
            Arc::clone(&gpio),
            registry,
            Arc::clone(&clock),
        ));
        (gpio, clock, LaunchSequencer::new(output))
    }

    #[test]
    fn grouped_launch() {
        let (gpio, clock, seq) = sequencer();
        assert_eq!(seq.launch(&[3, 5, 9]).unwrap(), vec![3, 5, 9]);
        assert_eq!(
            gpio.writes(),
            vec![
                (7, Level::High),
                (12, Level::High),
                (19, Level::High),
                (7, Level::Low),
                (12, Level::Low),
                (19, Level::Low),
            ]
        );
        assert_eq!(clock.delays(), vec![1500]);
    }

    #[test]
    fn unknown_tube_writes_nothing() {
        let (gpio, clock, seq) = sequencer();
        assert_eq!(seq.launch(&[2, 15]), Err(LauncherError::UnknownTubeId(15)));
        assert!(gpio.writes().is_empty());
        assert!(clock.delays().is_empty());
        assert!(seq.firing().is_empty());
    }

    #[test]
    fn empty_request_rejected() {
        let (_, _, seq) = sequencer();
        assert_eq!(seq.launch(&[]), Err(LauncherError::EmptyLaunchRequest));
    }

    #[test]
    fn duplicates_fire_once() {
        let (gpio, _, seq) = sequencer();
        assert_eq!(seq.launch(&[4, 4, 1]).unwrap(), vec![4, 1]);
        assert_eq!(gpio.writes_to(5), vec![Level::High, Level::Low]);
    }

    #[test]
    fn busy_tube_rejected() {
        let (gpio, _, seq) = sequencer();
        let _held = seq.reserve(&[6]).unwrap();
        assert_eq!(seq.launch(&[1, 6]), Err(LauncherError::TubeBusy(6)));
        assert!(gpio.writes().is_empty());
        assert_eq!(seq.firing(), vec![6]);
    }

    #[test]
    fn reservation_released_after_launch() {
        let (_, _, seq) = sequencer();
        seq.launch(&[2]).unwrap();
        assert!(seq.firing().is_empty());
        assert!(seq.launch(&[2]).is_ok());
    }

    #[test]
    fn failed_high_lowers_everything() {
        let (gpio, clock, seq) = sequencer();
        gpio.fail_writes_to(12); // tube 5
        assert!(matches!(
            seq.launch(&[3, 5, 9]),
            Err(LauncherError::Hardware(_))
        ));
        assert_eq!(gpio.writes_to(7), vec![Level::High, Level::Low]);
        assert_eq!(gpio.writes_to(19), vec![Level::Low]);
        assert!(clock.delays().is_empty());
        assert!(seq.firing().is_empty());
    }

    #[test]
    fn failed_low_still_attempts_all() {
        let (gpio, _, seq) = sequencer();
        seq.output.time().on_delay({
            let gpio = Arc::clone(&gpio);
            move |_| gpio.fail_writes_to(7)
        });
        assert!(seq.launch(&[3, 5]).is_err());
        assert_eq!(gpio.writes_to(12), vec![Level::High, Level::Low]);
    }

    #[test]
    fn launch_all_fires_every_tube() {
        let (gpio, clock, seq) = sequencer();
        let fired = seq.launch_all().unwrap();
        assert_eq!(fired, (1..=14).collect::<Vec<_>>());
        assert_eq!(gpio.writes().len(), 28);
        assert!(gpio.writes_to(25).is_empty());
        assert_eq!(clock.delays(), vec![1500]);
    }

    #[test]
    fn relay_test_cycles_each_output() {
        let (gpio, clock, seq) = sequencer();
        let seq = seq.with_test_delay_ms(100);
        seq.relay_test().unwrap();

        let writes = gpio.writes();
        assert_eq!(writes.len(), 36);
        assert_eq!(writes[0], (8, Level::High));
        assert_eq!(writes[1], (8, Level::Low));
        assert_eq!(clock.delays(), vec![100; 18]);
    }

    #[test]
    fn custom_launch_duration() {
        let (_, clock, seq) = sequencer();
        let seq = seq.with_launch_ms(3000);
        seq.launch(&[1]).unwrap();
        assert_eq!(clock.delays(), vec![3000]);
    }
}
