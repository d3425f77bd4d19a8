//! Limit switch monitoring.
//!
//! [`LimitSwitchMonitor`] is an explicit tick loop: [`tick`](LimitSwitchMonitor::tick)
//! checks every moving direction once, [`run`](LimitSwitchMonitor::run)
//! repeats it at the poll interval until a [`ShutdownSignal`] fires.
//!
//! On contact the offending direction is stopped and the turret is backed off
//! the switch by driving the opposite relay for the reversal duration. The
//! reversal wait blocks the loop but holds no lock, so emergency stop can
//! interrupt it at any time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::error::{LauncherError, Result};
use crate::motion::{MotionController, ReversalStart};
use crate::traits::{AxisDirection, GpioBackend, Timebase};

// ============================================================================
// Shutdown Signal
// ============================================================================

/// Cooperative cancellation flag shared by the background loops.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown was requested.
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tick Report
// ============================================================================

/// What a tick did for one direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitEvent {
    /// Contact: stopped and reversed for the reversal duration.
    Reversed {
        /// Direction that hit its switch.
        direction: AxisDirection,
    },
    /// Contact: stopped, no reversal (opposite switch also asserted).
    Stopped {
        /// Direction that hit its switch.
        direction: AxisDirection,
    },
    /// Moving longer than the configured maximum: stopped.
    Overdue {
        /// Direction that was cut off.
        direction: AxisDirection,
    },
}

/// Outcome of one [`LimitSwitchMonitor::tick`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Actions taken.
    pub events: Vec<LimitEvent>,
    /// Per-direction failures; the tick continued past each one.
    pub errors: Vec<(AxisDirection, LauncherError)>,
}

impl TickReport {
    /// Returns `true` if nothing happened.
    pub fn is_quiet(&self) -> bool {
        self.events.is_empty() && self.errors.is_empty()
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Polls the limit switches of every moving direction.
pub struct LimitSwitchMonitor<G: GpioBackend, T: Timebase> {
    motion: Arc<MotionController<G, T>>,
    poll_interval_ms: u64,
    reversal_ms: u64,
    max_move_ms: Option<u64>,
}

impl<G: GpioBackend, T: Timebase> LimitSwitchMonitor<G, T> {
    /// Creates a monitor with the default 100 ms poll and 200 ms reversal.
    pub fn new(motion: Arc<MotionController<G, T>>) -> Self {
        Self {
            motion,
            poll_interval_ms: 100,
            reversal_ms: 200,
            max_move_ms: None,
        }
    }

    /// Set the poll interval
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the reversal duration
    pub fn with_reversal_ms(mut self, ms: u64) -> Self {
        self.reversal_ms = ms;
        self
    }

    /// Stop any direction moving longer than `ms` (`None` disables)
    pub fn with_max_move_ms(mut self, ms: Option<u64>) -> Self {
        self.max_move_ms = ms;
        self
    }

    /// Checks every direction that was moving at the start of the tick.
    pub fn tick(&self) -> TickReport {
        let snapshot = self.motion.snapshot();
        let mut report = TickReport::default();

        for direction in AxisDirection::ALL {
            if !snapshot.is_moving(direction) {
                continue;
            }
            match self.check(direction) {
                Ok(Some(event)) => report.events.push(event),
                Ok(None) => {}
                Err(err) => {
                    error!(%direction, error = %err, "limit check failed");
                    report.errors.push((direction, err));
                }
            }
        }
        report
    }

    fn check(&self, direction: AxisDirection) -> Result<Option<LimitEvent>> {
        if self.motion.limit_asserted(direction)? {
            warn!(%direction, "limit switch contact");
            return match self.motion.begin_reversal(direction)? {
                ReversalStart::NotMoving => Ok(None),
                ReversalStart::StoppedOnly => Ok(Some(LimitEvent::Stopped { direction })),
                ReversalStart::Reversing { opposite, token } => {
                    self.motion.output().time().delay_ms(self.reversal_ms);
                    if !self.motion.end_reversal(opposite, token)? {
                        debug!(%direction, %opposite, "reversal complete");
                    }
                    Ok(Some(LimitEvent::Reversed { direction }))
                }
            };
        }

        if let Some(max_ms) = self.max_move_ms {
            if self.motion.stop_if_overdue(direction, max_ms)? {
                warn!(%direction, max_ms, "movement exceeded maximum on-time");
                return Ok(Some(LimitEvent::Overdue { direction }));
            }
        }
        Ok(None)
    }

    /// Ticks until `shutdown` is triggered.
    pub fn run(&self, shutdown: &ShutdownSignal) {
        debug!(poll_ms = self.poll_interval_ms, "limit monitor started");
        while !shutdown.is_triggered() {
            self.tick();
            self.motion.output().time().delay_ms(self.poll_interval_ms);
        }
        debug!("limit monitor stopped");
    }

    /// Runs the loop on a named background thread.
    pub fn spawn(self: Arc<Self>, shutdown: ShutdownSignal) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("limit-monitor".into())
            .spawn(move || self.run(&shutdown))
    }
}
