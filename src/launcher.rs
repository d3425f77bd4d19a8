//! The launcher: every command of the control core behind one type.
//!
//! [`Launcher`] wires the pin registry, output driver, motion controller,
//! limit monitor, both encoder trackers and the launch sequencer together.
//! Commands are synchronous and may block for their fixed durations; the
//! limit monitor and the encoder callbacks run in the background once
//! [`Launcher::start_background`] is called.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prl_launcher::hal::{MockClock, MockGpio};
//! use prl_launcher::{Config, Launcher, LauncherError};
//!
//! let gpio = Arc::new(MockGpio::new());
//! let launcher = Launcher::new(&Config::default(), Arc::clone(&gpio), Arc::new(MockClock::new())).unwrap();
//!
//! assert_eq!(launcher.launch(&[3]).unwrap(), vec![3]);
//! assert_eq!(launcher.launch(&[99]), Err(LauncherError::UnknownTubeId(99)));
//! launcher.emergency_stop();
//! assert!(!launcher.query_motion_state().any());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::config::Config;
use crate::encoder::{EncoderCounts, RotaryEncoderTracker};
use crate::error::{LauncherError, Result};
use crate::launch::LaunchSequencer;
use crate::limit::{LimitSwitchMonitor, ShutdownSignal};
use crate::motion::{MotionController, MotionSnapshot, MoveAction, MoveRequest};
use crate::output::{AuditEntry, OutputDriver};
use crate::traits::{Axis, GpioBackend, Timebase};

/// Motion and launch control core.
pub struct Launcher<G: GpioBackend, T: Timebase> {
    output: Arc<OutputDriver<G, T>>,
    motion: Arc<MotionController<G, T>>,
    monitor: Arc<LimitSwitchMonitor<G, T>>,
    sequencer: LaunchSequencer<G, T>,
    encoders: [Arc<RotaryEncoderTracker<G, T>>; 2],
    background: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl<G: GpioBackend, T: Timebase> Launcher<G, T> {
    /// Validates `config`, configures every pin and drives all outputs low.
    ///
    /// # Errors
    ///
    /// [`LauncherError::Configuration`] for an invalid config,
    /// [`LauncherError::Hardware`] if a pin cannot be configured.
    pub fn new(config: &Config, gpio: Arc<G>, time: Arc<T>) -> Result<Self> {
        let timing = &config.timing;
        timing.validate()?;
        let registry = Arc::new(config.registry()?);

        let output = Arc::new(OutputDriver::new(
            Arc::clone(&gpio),
            Arc::clone(&registry),
            Arc::clone(&time),
        ));
        output.init()?;

        let motion = Arc::new(MotionController::new(Arc::clone(&output)));
        let monitor = Arc::new(
            LimitSwitchMonitor::new(Arc::clone(&motion))
                .with_poll_interval_ms(timing.limit_poll_interval_ms)
                .with_reversal_ms(timing.limit_reversal_duration_ms)
                .with_max_move_ms(timing.max_move_duration_ms),
        );
        let sequencer = LaunchSequencer::new(Arc::clone(&output))
            .with_launch_ms(timing.launch_duration_ms)
            .with_test_delay_ms(timing.relay_test_delay_ms);

        let encoders = Axis::ALL.map(|axis| {
            let (clock, data) = registry.encoder_pins(axis);
            Arc::new(RotaryEncoderTracker::new(
                axis,
                clock.clone(),
                data.clone(),
                Arc::clone(&gpio),
                Arc::clone(&time),
                timing.encoder_debounce_ms,
            ))
        });

        info!(
            tubes = registry.tube_ids().count(),
            outputs = registry.outputs().count(),
            "launcher initialized"
        );
        Ok(Self {
            output,
            motion,
            monitor,
            sequencer,
            encoders,
            background: Arc::new(AtomicBool::new(false)),
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Fires the given tubes together. See [`LaunchSequencer::launch`].
    pub fn launch(&self, tube_ids: &[u32]) -> Result<Vec<u32>> {
        self.sequencer.launch(tube_ids)
    }

    /// Fires every registered tube together.
    pub fn launch_all(&self) -> Result<Vec<u32>> {
        self.sequencer.launch_all()
    }

    /// Cycles every output relay once.
    pub fn relay_test(&self) -> Result<()> {
        self.sequencer.relay_test()
    }

    /// Starts every direction named in `request`.
    pub fn move_start(&self, request: &MoveRequest) -> Result<()> {
        self.motion.apply(request, MoveAction::Start)
    }

    /// Stops every direction named in `request`.
    pub fn move_stop(&self, request: &MoveRequest) -> Result<()> {
        self.motion.apply(request, MoveAction::Stop)
    }

    /// All motion relays low, all flags cleared. Never fails.
    pub fn emergency_stop(&self) {
        self.motion.emergency_stop();
    }

    /// The four moving flags.
    pub fn query_motion_state(&self) -> MotionSnapshot {
        self.motion.snapshot()
    }

    /// Both encoder counters.
    pub fn query_encoder_counts(&self) -> EncoderCounts {
        EncoderCounts {
            vertical: self.encoder(Axis::Vertical).turn_count(),
            horizontal: self.encoder(Axis::Horizontal).turn_count(),
        }
    }

    /// Recent pin transitions, oldest first.
    pub fn audit_trail(&self) -> Vec<AuditEntry> {
        self.output.audit_trail()
    }

    /// Registered tube ids, ascending.
    pub fn tube_ids(&self) -> Vec<u32> {
        self.output.registry().tube_ids().collect()
    }

    // ========================================================================
    // Components
    // ========================================================================

    /// The motion controller.
    pub fn motion(&self) -> &Arc<MotionController<G, T>> {
        &self.motion
    }

    /// The limit monitor (for single-stepping ticks).
    pub fn monitor(&self) -> &Arc<LimitSwitchMonitor<G, T>> {
        &self.monitor
    }

    /// The encoder tracker of `axis`.
    pub fn encoder(&self, axis: Axis) -> &Arc<RotaryEncoderTracker<G, T>> {
        &self.encoders[axis.index()]
    }

    /// The output driver.
    pub fn output(&self) -> &Arc<OutputDriver<G, T>> {
        &self.output
    }

    // ========================================================================
    // Background Tasks
    // ========================================================================

    /// Starts both encoder trackers and the limit monitor thread.
    ///
    /// Everything runs until the returned guard is dropped. Dropping it
    /// (including during a panic unwind) stops the loops, forces every
    /// output low and releases the pins. A failed start tears down the
    /// same way. Starting again after a shutdown reconfigures every pin
    /// first.
    ///
    /// # Errors
    ///
    /// [`LauncherError::Configuration`] if background tasks are already
    /// running, [`LauncherError::Hardware`] if a released pin cannot be
    /// configured again or an edge watch cannot be set up.
    pub fn start_background(&self) -> Result<BackgroundTasks<G, T>> {
        if self.background.swap(true, Ordering::SeqCst) {
            return Err(LauncherError::config("background tasks already running"));
        }

        let mut tasks = BackgroundTasks {
            shutdown: ShutdownSignal::new(),
            monitor: None,
            encoders: self.encoders.clone(),
            motion: Arc::clone(&self.motion),
            output: Arc::clone(&self.output),
            running: Arc::clone(&self.background),
            released: Arc::clone(&self.released),
        };

        if self.released.swap(false, Ordering::SeqCst) {
            self.output.init()?;
            info!("pins reconfigured after shutdown");
        }
        for encoder in &self.encoders {
            encoder.start()?;
        }
        let handle = Arc::clone(&self.monitor)
            .spawn(tasks.shutdown.clone())
            .map_err(|err| LauncherError::config(format!("cannot spawn limit monitor: {err}")))?;
        tasks.monitor = Some(handle);

        info!("background tasks started");
        Ok(tasks)
    }
}

/// Guard over the background activities.
///
/// Shutdown order on drop: signal the monitor and wait for it, deregister
/// both encoder callbacks, emergency stop, force every output low, release
/// the pins.
pub struct BackgroundTasks<G: GpioBackend, T: Timebase> {
    shutdown: ShutdownSignal,
    monitor: Option<JoinHandle<()>>,
    encoders: [Arc<RotaryEncoderTracker<G, T>>; 2],
    motion: Arc<MotionController<G, T>>,
    output: Arc<OutputDriver<G, T>>,
    running: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl<G: GpioBackend, T: Timebase> BackgroundTasks<G, T> {
    /// Shuts down now instead of at drop.
    pub fn shutdown(self) {}
}

impl<G: GpioBackend, T: Timebase> Drop for BackgroundTasks<G, T> {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.monitor.take() {
            if handle.join().is_err() {
                warn!("limit monitor thread panicked");
            }
        }
        for encoder in &self.encoders {
            encoder.stop();
        }
        self.motion.emergency_stop();
        if let Err(err) = self.output.force_all_low() {
            warn!(error = %err, "not every output could be forced low");
        }
        self.output.gpio().release();
        self.released.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        info!("background tasks stopped, pins released");
    }
}
