//! Turret motion arbitration.
//!
//! [`MotionController`] owns one moving flag per [`AxisDirection`], grouped by
//! axis behind one mutex each. Every read-modify-write of a flag and the
//! matching relay write happen under that axis lock, so the request thread,
//! the limit monitor and emergency stop never leave both directions of an
//! axis energized.
//!
//! No method sleeps while holding a lock. The limit reversal is split into
//! [`begin_reversal`](MotionController::begin_reversal) (under the lock) and
//! [`end_reversal`](MotionController::end_reversal) issued by the caller after
//! its wait. The two halves are tied by a [`ReversalToken`]: anything that
//! claims the axis in between (a start, an emergency stop) invalidates it, so
//! the late stop cannot cancel a movement the operator started meanwhile.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HardwareError, LauncherError, Result};
use crate::output::OutputDriver;
use crate::traits::{Axis, AxisDirection, GpioBackend, Level, Timebase};

// ============================================================================
// Request / State Types
// ============================================================================

/// A movement command: at most one direction per axis.
///
/// Deserializes from `{"up": true, "cw": false, ...}`; missing keys are false.
///
/// ```
/// use prl_launcher::{AxisDirection, LauncherError, MoveRequest};
///
/// let req: MoveRequest = AxisDirection::Up.into();
/// assert!(req.validate().is_ok());
///
/// let bad = MoveRequest { up: true, down: true, ..Default::default() };
/// assert!(matches!(bad.validate(), Err(LauncherError::ConflictingDirections { .. })));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveRequest {
    /// Tilt up.
    pub up: bool,
    /// Tilt down.
    pub down: bool,
    /// Pan clockwise.
    pub cw: bool,
    /// Pan counter-clockwise.
    pub ccw: bool,
}

impl MoveRequest {
    /// Whether `direction` is named.
    pub fn contains(&self, direction: AxisDirection) -> bool {
        match direction {
            AxisDirection::Up => self.up,
            AxisDirection::Down => self.down,
            AxisDirection::Clockwise => self.cw,
            AxisDirection::CounterClockwise => self.ccw,
        }
    }

    /// Rejects a request naming both directions of one axis.
    pub fn validate(&self) -> Result<()> {
        if self.up && self.down {
            return Err(LauncherError::ConflictingDirections {
                axis: Axis::Vertical,
            });
        }
        if self.cw && self.ccw {
            return Err(LauncherError::ConflictingDirections {
                axis: Axis::Horizontal,
            });
        }
        Ok(())
    }

    /// Named directions in relay order.
    pub fn directions(&self) -> impl Iterator<Item = AxisDirection> + '_ {
        AxisDirection::ALL
            .into_iter()
            .filter(move |&dir| self.contains(dir))
    }

    /// Returns `true` if no direction is named.
    pub fn is_empty(&self) -> bool {
        self.directions().next().is_none()
    }
}

impl From<AxisDirection> for MoveRequest {
    fn from(direction: AxisDirection) -> Self {
        let mut req = Self::default();
        match direction {
            AxisDirection::Up => req.up = true,
            AxisDirection::Down => req.down = true,
            AxisDirection::Clockwise => req.cw = true,
            AxisDirection::CounterClockwise => req.ccw = true,
        }
        req
    }
}

/// Which half of the movement API a [`MoveRequest`] goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveAction {
    /// Start every named direction.
    Start,
    /// Stop every named direction.
    Stop,
}

/// Point-in-time copy of the four moving flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionSnapshot {
    /// Tilting up.
    pub up: bool,
    /// Tilting down.
    pub down: bool,
    /// Panning clockwise.
    pub cw: bool,
    /// Panning counter-clockwise.
    pub ccw: bool,
}

impl MotionSnapshot {
    /// Flag for `direction`.
    pub fn is_moving(&self, direction: AxisDirection) -> bool {
        match direction {
            AxisDirection::Up => self.up,
            AxisDirection::Down => self.down,
            AxisDirection::Clockwise => self.cw,
            AxisDirection::CounterClockwise => self.ccw,
        }
    }

    /// Returns `true` if anything is moving.
    pub fn any(&self) -> bool {
        self.up || self.down || self.cw || self.ccw
    }
}

/// Result of [`MotionController::start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// Relay energized.
    Started,
    /// Already moving that way; nothing written.
    AlreadyMoving,
    /// Target limit switch asserted; relay left off.
    AtLimit,
}

/// Ties the two halves of a limit reversal to one claim on the axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReversalToken(u64);

/// Result of [`MotionController::begin_reversal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReversalStart {
    /// The direction was no longer moving; nothing written.
    NotMoving,
    /// Direction stopped and the opposite relay energized.
    Reversing {
        /// Direction now backing off the switch.
        opposite: AxisDirection,
        /// Pass to [`MotionController::end_reversal`].
        token: ReversalToken,
    },
    /// Direction stopped, but the opposite limit is asserted too.
    StoppedOnly,
}

// ============================================================================
// Motion Controller
// ============================================================================

#[derive(Clone, Copy, Debug, Default)]
struct AxisFlags {
    /// Start time per slot, `None` when idle.
    moving: [Option<u64>; 2],
    /// Bumped whenever a slot is claimed or the axis is emergency stopped.
    epoch: u64,
}

impl AxisFlags {
    fn claim(&mut self, direction: AxisDirection, now_ms: u64) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.moving[direction.slot()] = Some(now_ms);
        self.epoch
    }
}

/// Arbitrates the four motion relays.
pub struct MotionController<G: GpioBackend, T: Timebase> {
    output: Arc<OutputDriver<G, T>>,
    axes: [Mutex<AxisFlags>; 2],
}

impl<G: GpioBackend, T: Timebase> MotionController<G, T> {
    /// Creates a controller with every direction idle.
    pub fn new(output: Arc<OutputDriver<G, T>>) -> Self {
        Self {
            output,
            axes: [Mutex::new(AxisFlags::default()), Mutex::new(AxisFlags::default())],
        }
    }

    fn lock(&self, axis: Axis) -> MutexGuard<'_, AxisFlags> {
        self.axes[axis.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_relay(&self, direction: AxisDirection, level: Level) -> Result<()> {
        let relay = self.output.registry().motion_relay(direction);
        self.output.write_pin(relay, level)
    }

    /// Starts moving in `direction`.
    ///
    /// Stops the opposite direction first if it is active. The relay is only
    /// energized when the limit switch on that side is open.
    pub fn start(&self, direction: AxisDirection) -> Result<StartOutcome> {
        let mut flags = self.lock(direction.axis());
        if flags.moving[direction.slot()].is_some() {
            return Ok(StartOutcome::AlreadyMoving);
        }

        let opposite = direction.opposite();
        if flags.moving[opposite.slot()].is_some() {
            self.write_relay(opposite, Level::Low)?;
            flags.moving[opposite.slot()] = None;
            debug!(%opposite, "opposite direction cancelled");
        }

        if self.limit_asserted(direction)? {
            debug!(%direction, "start ignored, limit switch asserted");
            return Ok(StartOutcome::AtLimit);
        }

        self.write_relay(direction, Level::High)?;
        flags.claim(direction, self.output.time().now_ms());
        Ok(StartOutcome::Started)
    }

    /// Stops moving in `direction`. Always writes the relay low.
    ///
    /// The flag is only cleared once the write succeeded.
    pub fn stop(&self, direction: AxisDirection) -> Result<()> {
        let mut flags = self.lock(direction.axis());
        self.write_relay(direction, Level::Low)?;
        flags.moving[direction.slot()] = None;
        Ok(())
    }

    /// Applies a validated request. Nothing is written if validation fails.
    pub fn apply(&self, request: &MoveRequest, action: MoveAction) -> Result<()> {
        request.validate()?;
        for direction in request.directions() {
            match action {
                MoveAction::Start => {
                    self.start(direction)?;
                }
                MoveAction::Stop => self.stop(direction)?,
            }
        }
        Ok(())
    }

    /// Whether `direction` is currently moving.
    pub fn is_moving(&self, direction: AxisDirection) -> bool {
        self.lock(direction.axis()).moving[direction.slot()].is_some()
    }

    /// Copies all four flags.
    pub fn snapshot(&self) -> MotionSnapshot {
        let vertical = *self.lock(Axis::Vertical);
        let horizontal = *self.lock(Axis::Horizontal);
        MotionSnapshot {
            up: vertical.moving[AxisDirection::Up.slot()].is_some(),
            down: vertical.moving[AxisDirection::Down.slot()].is_some(),
            cw: horizontal.moving[AxisDirection::Clockwise.slot()].is_some(),
            ccw: horizontal.moving[AxisDirection::CounterClockwise.slot()].is_some(),
        }
    }

    /// Samples the limit switch at the end of travel in `direction`.
    pub fn limit_asserted(&self, direction: AxisDirection) -> core::result::Result<bool, HardwareError> {
        let switch = self.output.registry().limit_switch(direction);
        Ok(self.output.read_input(switch)?.is_high())
    }

    /// Drives all four motion relays low and clears every flag.
    ///
    /// Never fails: write errors are logged and the flags are cleared anyway.
    /// Returns the number of relay writes that failed.
    pub fn emergency_stop(&self) -> usize {
        let mut failures = 0;
        for axis in Axis::ALL {
            let mut flags = self.lock(axis);
            for direction in AxisDirection::ALL.into_iter().filter(|d| d.axis() == axis) {
                if let Err(err) = self.write_relay(direction, Level::Low) {
                    warn!(%direction, error = %err, "emergency stop write failed");
                    failures += 1;
                }
            }
            flags.moving = [None; 2];
            flags.epoch = flags.epoch.wrapping_add(1);
        }
        warn!(failures, "emergency stop");
        failures
    }

    /// First half of a limit reversal: stop `direction` and energize the
    /// opposite relay, atomically under the axis lock.
    ///
    /// The caller waits the reversal duration and then calls
    /// [`end_reversal`](Self::end_reversal) with the returned token.
    pub fn begin_reversal(&self, direction: AxisDirection) -> Result<ReversalStart> {
        let mut flags = self.lock(direction.axis());
        if flags.moving[direction.slot()].is_none() {
            return Ok(ReversalStart::NotMoving);
        }

        self.write_relay(direction, Level::Low)?;
        flags.moving[direction.slot()] = None;

        let opposite = direction.opposite();
        if self.limit_asserted(opposite)? {
            warn!(%direction, "both limit switches asserted, not reversing");
            return Ok(ReversalStart::StoppedOnly);
        }

        self.write_relay(opposite, Level::High)?;
        let token = ReversalToken(flags.claim(opposite, self.output.time().now_ms()));
        Ok(ReversalStart::Reversing { opposite, token })
    }

    /// Second half of a limit reversal: stop `opposite` unless the axis was
    /// claimed again since [`begin_reversal`](Self::begin_reversal).
    ///
    /// If a newer movement owns `opposite`, nothing is written. Otherwise the
    /// relay is written low (harmless when already idle). Returns `true` if
    /// the reversal was superseded.
    pub fn end_reversal(&self, opposite: AxisDirection, token: ReversalToken) -> Result<bool> {
        let mut flags = self.lock(opposite.axis());
        if flags.epoch != token.0 && flags.moving[opposite.slot()].is_some() {
            debug!(%opposite, "reversal superseded, leaving newer movement alone");
            return Ok(true);
        }
        self.write_relay(opposite, Level::Low)?;
        flags.moving[opposite.slot()] = None;
        Ok(false)
    }

    /// Stops `direction` if it has been moving for at least `max_ms`.
    ///
    /// Returns `true` if it was stopped.
    pub fn stop_if_overdue(&self, direction: AxisDirection, max_ms: u64) -> Result<bool> {
        let mut flags = self.lock(direction.axis());
        let Some(started) = flags.moving[direction.slot()] else {
            return Ok(false);
        };
        if self.output.time().now_ms().saturating_sub(started) < max_ms {
            return Ok(false);
        }
        self.write_relay(direction, Level::Low)?;
        flags.moving[direction.slot()] = None;
        Ok(true)
    }

    /// The output driver.
    pub fn output(&self) -> &Arc<OutputDriver<G, T>> {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockClock, MockGpio};
    use crate::pins::{reference_rig, PinRegistry};

    const UP: u32 = 25;
    const DOWN: u32 = 9;
    const CW: u32 = 24;
    const CCW: u32 = 10;
    const LIMIT_UP: u32 = 15;
    const LIMIT_DOWN: u32 = 2;

    fn controller() -> (Arc<MockGpio>, Arc<MockClock>, MotionController<MockGpio, MockClock>) {
        let gpio = Arc::new(MockGpio::new());
        let clock = Arc::new(MockClock::new());
        let registry = Arc::new(PinRegistry::new(reference_rig()).unwrap());
        let output = Arc::new(OutputDriver::new(
            Arc::clone(&gpio),
            registry,
            Arc::clone(&clock),
        ));
        (gpio, clock, MotionController::new(output))
    }

    #[test]
    fn start_energizes_relay() {
        let (gpio, _, motion) = controller();
        assert_eq!(motion.start(AxisDirection::Up).unwrap(), StartOutcome::Started);
        assert!(motion.is_moving(AxisDirection::Up));
        assert_eq!(gpio.writes(), vec![(UP, Level::High)]);
    }

    #[test]
    fn start_is_idempotent() {
        let (gpio, _, motion) = controller();
        motion.start(AxisDirection::Clockwise).unwrap();
        assert_eq!(
            motion.start(AxisDirection::Clockwise).unwrap(),
            StartOutcome::AlreadyMoving
        );
        assert_eq!(gpio.writes_to(CW), vec![Level::High]);
    }

    #[test]
    fn start_cancels_opposite() {
        let (gpio, _, motion) = controller();
        motion.start(AxisDirection::Up).unwrap();
        motion.start(AxisDirection::Down).unwrap();

        let snap = motion.snapshot();
        assert!(!snap.up);
        assert!(snap.down);
        assert_eq!(
            gpio.writes(),
            vec![(UP, Level::High), (UP, Level::Low), (DOWN, Level::High)]
        );
    }

    #[test]
    fn axes_are_independent() {
        let (_, _, motion) = controller();
        motion.start(AxisDirection::Up).unwrap();
        motion.start(AxisDirection::CounterClockwise).unwrap();
        let snap = motion.snapshot();
        assert!(snap.up && snap.ccw);
        assert!(!snap.down && !snap.cw);
    }

    #[test]
    fn start_against_asserted_limit_writes_nothing() {
        let (gpio, _, motion) = controller();
        gpio.set_input(LIMIT_UP, Level::High);
        assert_eq!(motion.start(AxisDirection::Up).unwrap(), StartOutcome::AtLimit);
        assert!(!motion.is_moving(AxisDirection::Up));
        assert!(gpio.writes().is_empty());
    }

    #[test]
    fn stop_always_writes_low() {
        let (gpio, _, motion) = controller();
        motion.stop(AxisDirection::Clockwise).unwrap();
        motion.stop(AxisDirection::Clockwise).unwrap();
        assert_eq!(gpio.writes_to(CW), vec![Level::Low, Level::Low]);
    }

    #[test]
    fn failed_stop_keeps_flag() {
        let (gpio, _, motion) = controller();
        motion.start(AxisDirection::Down).unwrap();
        gpio.fail_writes_to(DOWN);
        assert!(motion.stop(AxisDirection::Down).is_err());
        assert!(motion.is_moving(AxisDirection::Down));
    }

    #[test]
    fn failed_start_leaves_flag_clear() {
        let (gpio, _, motion) = controller();
        gpio.fail_writes_to(CCW);
        assert!(matches!(
            motion.start(AxisDirection::CounterClockwise),
            Err(LauncherError::Hardware(_))
        ));
        assert!(!motion.snapshot().any());
    }

    #[test]
    fn apply_rejects_conflicts_before_writing() {
        let (gpio, _, motion) = controller();
        let req = MoveRequest {
            cw: true,
            ccw: true,
            ..Default::default()
        };
        assert_eq!(
            motion.apply(&req, MoveAction::Start),
            Err(LauncherError::ConflictingDirections {
                axis: Axis::Horizontal
            })
        );
        assert_eq!(
            motion.apply(&req, MoveAction::Stop),
            Err(LauncherError::ConflictingDirections {
                axis: Axis::Horizontal
            })
        );
        assert!(gpio.writes().is_empty());
    }

    #[test]
    fn apply_starts_one_per_axis() {
        let (_, _, motion) = controller();
        let req = MoveRequest {
            down: true,
            cw: true,
            ..Default::default()
        };
        motion.apply(&req, MoveAction::Start).unwrap();
        assert_eq!(
            motion.snapshot(),
            MotionSnapshot {
                down: true,
                cw: true,
                ..Default::default()
            }
        );
        motion.apply(&req, MoveAction::Stop).unwrap();
        assert!(!motion.snapshot().any());
    }

    #[test]
    fn emergency_stop_clears_everything() {
        let (gpio, _, motion) = controller();
        motion.start(AxisDirection::Up).unwrap();
        motion.start(AxisDirection::Clockwise).unwrap();
        gpio.clear_writes();

        assert_eq!(motion.emergency_stop(), 0);
        assert!(!motion.snapshot().any());
        for relay in [UP, DOWN, CW, CCW] {
            assert_eq!(gpio.writes_to(relay), vec![Level::Low]);
        }
    }

    #[test]
    fn emergency_stop_clears_flags_despite_write_failure() {
        let (gpio, _, motion) = controller();
        motion.start(AxisDirection::Up).unwrap();
        gpio.fail_writes_to(UP);
        assert_eq!(motion.emergency_stop(), 1);
        assert!(!motion.is_moving(AxisDirection::Up));
        assert_eq!(gpio.writes_to(DOWN), vec![Level::Low]);
    }

    #[test]
    fn begin_reversal_swaps_direction() {
        let (gpio, _, motion) = controller();
        motion.start(AxisDirection::Up).unwrap();
        gpio.clear_writes();

        let ReversalStart::Reversing { opposite, token } =
            motion.begin_reversal(AxisDirection::Up).unwrap()
        else {
            panic!("expected a reversal");
        };
        assert_eq!(opposite, AxisDirection::Down);
        assert_eq!(gpio.writes(), vec![(UP, Level::Low), (DOWN, Level::High)]);
        assert!(motion.is_moving(AxisDirection::Down));
        assert!(!motion.is_moving(AxisDirection::Up));

        assert!(!motion.end_reversal(opposite, token).unwrap());
        assert!(!motion.snapshot().any());
        assert_eq!(gpio.writes_to(DOWN), vec![Level::High, Level::Low]);
    }

    #[test]
    fn end_reversal_leaves_newer_start_alone() {
        let (gpio, _, motion) = controller();
        motion.start(AxisDirection::Up).unwrap();
        let ReversalStart::Reversing { opposite, token } =
            motion.begin_reversal(AxisDirection::Up).unwrap()
        else {
            panic!("expected a reversal");
        };

        motion.emergency_stop();
        motion.start(AxisDirection::Down).unwrap();
        gpio.clear_writes();

        assert!(motion.end_reversal(opposite, token).unwrap());
        assert!(motion.is_moving(AxisDirection::Down));
        assert!(gpio.writes().is_empty());
    }

    #[test]
    fn end_reversal_after_emergency_stop_is_harmless() {
        let (gpio, _, motion) = controller();
        motion.start(AxisDirection::Clockwise).unwrap();
        let ReversalStart::Reversing { opposite, token } =
            motion.begin_reversal(AxisDirection::Clockwise).unwrap()
        else {
            panic!("expected a reversal");
        };

        motion.emergency_stop();
        assert!(!motion.end_reversal(opposite, token).unwrap());
        assert!(!motion.snapshot().any());
        assert_eq!(gpio.level(CCW), Level::Low);
    }

    #[test]
    fn begin_reversal_when_idle_is_noop() {
        let (gpio, _, motion) = controller();
        assert_eq!(
            motion.begin_reversal(AxisDirection::Clockwise).unwrap(),
            ReversalStart::NotMoving
        );
        assert!(gpio.writes().is_empty());
    }

    #[test]
    fn begin_reversal_blocked_by_opposite_limit() {
        let (gpio, _, motion) = controller();
        motion.start(AxisDirection::Up).unwrap();
        gpio.set_input(LIMIT_DOWN, Level::High);
        assert_eq!(
            motion.begin_reversal(AxisDirection::Up).unwrap(),
            ReversalStart::StoppedOnly
        );
        assert!(!motion.snapshot().any());
        assert!(gpio.writes_to(DOWN).is_empty());
    }

    #[test]
    fn overdue_directions_are_stopped() {
        let (gpio, clock, motion) = controller();
        motion.start(AxisDirection::CounterClockwise).unwrap();
        clock.advance(999);
        assert!(!motion
            .stop_if_overdue(AxisDirection::CounterClockwise, 1000)
            .unwrap());
        clock.advance(1);
        assert!(motion
            .stop_if_overdue(AxisDirection::CounterClockwise, 1000)
            .unwrap());
        assert!(!motion.is_moving(AxisDirection::CounterClockwise));
        assert_eq!(gpio.writes_to(CCW), vec![Level::High, Level::Low]);
        assert!(!motion
            .stop_if_overdue(AxisDirection::CounterClockwise, 1000)
            .unwrap());
    }

    #[test]
    fn move_request_helpers() {
        let req: MoveRequest = serde_json::from_str(r#"{"up": true, "ccw": true}"#).unwrap();
        assert_eq!(
            req.directions().collect::<Vec<_>>(),
            vec![AxisDirection::Up, AxisDirection::CounterClockwise]
        );
        assert!(!req.is_empty());
        assert!(MoveRequest::default().is_empty());
        assert!(MoveRequest::from(AxisDirection::Down).down);
    }
}
