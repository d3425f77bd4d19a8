//! Logical pin map and registry.
//!
//! The pin map is plain data: a list of [`LogicalPin`]s, usually loaded from
//! the `[[pins]]` tables of the config file. [`PinRegistry`] validates it once
//! at startup and resolves the roles the launcher needs (motion relays, limit
//! switches, encoder pins, one launch relay per tube).
//!
//! # Naming
//!
//! | Role | Name |
//! |------|------|
//! | Launch relay for tube `n` | `launch_<n>` (n ≥ 1) |
//! | Motion relays | `move_output_up`, `move_output_down`, `move_output_cw`, `move_output_ccw` |
//! | Limit switches | `move_input_ver_switch_up`, `move_input_ver_switch_down`, `move_input_hor_switch_cw`, `move_input_hor_switch_ccw` |
//! | Encoders | `encoder_ver_clock`, `encoder_ver_data`, `encoder_hor_clock`, `encoder_hor_data` |
//!
//! # Example
//!
//! ```rust
//! use prl_launcher::pins::{reference_rig, PinRegistry};
//! use prl_launcher::AxisDirection;
//!
//! let registry = PinRegistry::new(reference_rig()).unwrap();
//! assert_eq!(registry.motion_relay(AxisDirection::Up).physical_id, 25);
//! assert_eq!(registry.tube_relay(3).unwrap().physical_id, 7);
//! assert!(registry.tube_relay(99).is_none());
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{LauncherError, Result};
use crate::traits::{Axis, AxisDirection};

/// Pin names with a fixed role.
pub mod names {
    use crate::traits::{Axis, AxisDirection};

    /// Prefix of every launch relay name (`launch_1`, `launch_2`, ...).
    pub const LAUNCH_PREFIX: &str = "launch_";

    /// Tilt-up motor relay.
    pub const MOVE_OUTPUT_UP: &str = "move_output_up";
    /// Tilt-down motor relay.
    pub const MOVE_OUTPUT_DOWN: &str = "move_output_down";
    /// Pan-clockwise motor relay.
    pub const MOVE_OUTPUT_CW: &str = "move_output_cw";
    /// Pan-counter-clockwise motor relay.
    pub const MOVE_OUTPUT_CCW: &str = "move_output_ccw";

    /// Upper tilt limit switch.
    pub const LIMIT_UP: &str = "move_input_ver_switch_up";
    /// Lower tilt limit switch.
    pub const LIMIT_DOWN: &str = "move_input_ver_switch_down";
    /// Clockwise pan limit switch.
    pub const LIMIT_CW: &str = "move_input_hor_switch_cw";
    /// Counter-clockwise pan limit switch.
    pub const LIMIT_CCW: &str = "move_input_hor_switch_ccw";

    /// Vertical encoder clock (CLK).
    pub const ENCODER_VER_CLOCK: &str = "encoder_ver_clock";
    /// Vertical encoder data (DT).
    pub const ENCODER_VER_DATA: &str = "encoder_ver_data";
    /// Horizontal encoder clock (CLK).
    pub const ENCODER_HOR_CLOCK: &str = "encoder_hor_clock";
    /// Horizontal encoder data (DT).
    pub const ENCODER_HOR_DATA: &str = "encoder_hor_data";

    /// Relay name driving `direction`.
    pub const fn motion_output(direction: AxisDirection) -> &'static str {
        match direction {
            AxisDirection::Up => MOVE_OUTPUT_UP,
            AxisDirection::Down => MOVE_OUTPUT_DOWN,
            AxisDirection::Clockwise => MOVE_OUTPUT_CW,
            AxisDirection::CounterClockwise => MOVE_OUTPUT_CCW,
        }
    }

    /// Limit switch name at the end of travel in `direction`.
    pub const fn limit_input(direction: AxisDirection) -> &'static str {
        match direction {
            AxisDirection::Up => LIMIT_UP,
            AxisDirection::Down => LIMIT_DOWN,
            AxisDirection::Clockwise => LIMIT_CW,
            AxisDirection::CounterClockwise => LIMIT_CCW,
        }
    }

    /// `(clock, data)` pin names of the encoder on `axis`.
    pub const fn encoder_pins(axis: Axis) -> (&'static str, &'static str) {
        match axis {
            Axis::Vertical => (ENCODER_VER_CLOCK, ENCODER_VER_DATA),
            Axis::Horizontal => (ENCODER_HOR_CLOCK, ENCODER_HOR_DATA),
        }
    }

    /// Launch relay name for `tube_id`.
    pub fn launch_output(tube_id: u32) -> String {
        format!("{LAUNCH_PREFIX}{tube_id}")
    }
}

/// Pin direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinDirection {
    /// Relay output.
    Output,
    /// Switch or encoder input.
    Input,
}

/// Input pull configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pull {
    /// No internal pull resistor.
    #[default]
    None,
    /// Internal pull-down (switch closes to 3.3V).
    PullDown,
}

/// One entry of the pin map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalPin {
    /// Logical name (see [`names`]).
    pub name: String,
    /// Physical pin id (BCM numbering on the reference rig).
    pub physical_id: u32,
    /// Input or output.
    pub direction: PinDirection,
    /// Pull configuration, inputs only.
    #[serde(default)]
    pub pull: Pull,
}

impl LogicalPin {
    /// Creates an output pin.
    pub fn output(name: impl Into<String>, physical_id: u32) -> Self {
        Self {
            name: name.into(),
            physical_id,
            direction: PinDirection::Output,
            pull: Pull::None,
        }
    }

    /// Creates an input pin with a pull-down.
    pub fn input(name: impl Into<String>, physical_id: u32) -> Self {
        Self {
            name: name.into(),
            physical_id,
            direction: PinDirection::Input,
            pull: Pull::PullDown,
        }
    }

    /// Returns `true` for output pins.
    #[inline]
    pub fn is_output(&self) -> bool {
        self.direction == PinDirection::Output
    }

    /// Tube id if this is a `launch_<n>` relay.
    pub fn tube_id(&self) -> Option<u32> {
        self.name
            .strip_prefix(names::LAUNCH_PREFIX)
            .and_then(|id| id.parse().ok())
    }
}

/// Pin map of the reference rig: 18 outputs and 8 inputs, BCM numbering.
///
/// Launch relays 1–12 and the four motion relays keep the PRL2016 wiring;
/// relays 13–14, the limit switches and the encoders use the remaining
/// header pins.
pub fn reference_rig() -> Vec<LogicalPin> {
    const LAUNCH: [u32; 14] = [8, 11, 7, 5, 12, 6, 13, 16, 19, 20, 26, 21, 4, 14];

    let mut pins: Vec<LogicalPin> = LAUNCH
        .iter()
        .enumerate()
        .map(|(i, &id)| LogicalPin::output(names::launch_output(i as u32 + 1), id))
        .collect();

    pins.extend([
        LogicalPin::output(names::MOVE_OUTPUT_UP, 25),
        LogicalPin::output(names::MOVE_OUTPUT_DOWN, 9),
        LogicalPin::output(names::MOVE_OUTPUT_CCW, 10),
        LogicalPin::output(names::MOVE_OUTPUT_CW, 24),
        LogicalPin::input(names::LIMIT_UP, 15),
        LogicalPin::input(names::LIMIT_DOWN, 2),
        LogicalPin::input(names::LIMIT_CW, 27),
        LogicalPin::input(names::LIMIT_CCW, 3),
        LogicalPin::input(names::ENCODER_VER_CLOCK, 17),
        LogicalPin::input(names::ENCODER_VER_DATA, 18),
        LogicalPin::input(names::ENCODER_HOR_CLOCK, 23),
        LogicalPin::input(names::ENCODER_HOR_DATA, 22),
    ]);

    pins
}

/// Validated, immutable pin map.
#[derive(Clone, Debug)]
pub struct PinRegistry {
    pins: Vec<LogicalPin>,
    by_name: HashMap<String, usize>,
    tubes: BTreeMap<u32, usize>,
    motion: [usize; 4],
    limits: [usize; 4],
    encoders: [(usize, usize); 2],
}

impl PinRegistry {
    /// Validates `pins` and resolves every fixed role.
    ///
    /// # Errors
    ///
    /// [`LauncherError::Configuration`] when a name or physical id is
    /// duplicated, two `launch_` names parse to the same tube id, a required
    /// role is missing or has the wrong direction, a `launch_` name does not
    /// carry a tube id ≥ 1, or no launch relay exists.
    pub fn new(pins: Vec<LogicalPin>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(pins.len());
        let mut ids = HashSet::with_capacity(pins.len());
        let mut tubes = BTreeMap::new();

        for (index, pin) in pins.iter().enumerate() {
            if by_name.insert(pin.name.clone(), index).is_some() {
                return Err(LauncherError::config(format!(
                    "duplicate pin name '{}'",
                    pin.name
                )));
            }
            if !ids.insert(pin.physical_id) {
                return Err(LauncherError::config(format!(
                    "physical pin {} is mapped twice",
                    pin.physical_id
                )));
            }
            if pin.name.starts_with(names::LAUNCH_PREFIX) {
                let tube = pin.tube_id().filter(|&id| id >= 1).ok_or_else(|| {
                    LauncherError::config(format!("'{}' does not name a tube id >= 1", pin.name))
                })?;
                if !pin.is_output() {
                    return Err(LauncherError::config(format!(
                        "launch relay '{}' must be an output",
                        pin.name
                    )));
                }
                if let Some(previous) = tubes.insert(tube, index) {
                    return Err(LauncherError::config(format!(
                        "'{}' and '{}' both name tube {tube}",
                        pins[previous].name, pin.name
                    )));
                }
            }
        }

        if tubes.is_empty() {
            return Err(LauncherError::config("pin map has no launch relays"));
        }

        let resolve = |name: &str, direction: PinDirection| -> Result<usize> {
            let index = *by_name
                .get(name)
                .ok_or_else(|| LauncherError::config(format!("missing pin '{name}'")))?;
            if pins[index].direction != direction {
                return Err(LauncherError::config(format!(
                    "pin '{name}' must be an {}",
                    match direction {
                        PinDirection::Output => "output",
                        PinDirection::Input => "input",
                    }
                )));
            }
            Ok(index)
        };

        let mut motion = [0; 4];
        let mut limits = [0; 4];
        for dir in AxisDirection::ALL {
            motion[dir.index()] = resolve(names::motion_output(dir), PinDirection::Output)?;
            limits[dir.index()] = resolve(names::limit_input(dir), PinDirection::Input)?;
        }

        let mut encoders = [(0, 0); 2];
        for axis in Axis::ALL {
            let (clock, data) = names::encoder_pins(axis);
            encoders[axis.index()] = (
                resolve(clock, PinDirection::Input)?,
                resolve(data, PinDirection::Input)?,
            );
        }

        Ok(Self {
            pins,
            by_name,
            tubes,
            motion,
            limits,
            encoders,
        })
    }

    /// Looks up a pin by logical name.
    pub fn get(&self, name: &str) -> Option<&LogicalPin> {
        self.by_name.get(name).map(|&i| &self.pins[i])
    }

    /// Looks up an output pin by logical name.
    ///
    /// # Errors
    ///
    /// [`LauncherError::Configuration`] if the pin is unknown or an input.
    pub fn output(&self, name: &str) -> Result<&LogicalPin> {
        let pin = self
            .get(name)
            .ok_or_else(|| LauncherError::config(format!("unknown pin '{name}'")))?;
        if !pin.is_output() {
            return Err(LauncherError::config(format!(
                "pin '{name}' is not registered as an output"
            )));
        }
        Ok(pin)
    }

    /// All pins in declaration order.
    pub fn pins(&self) -> &[LogicalPin] {
        &self.pins
    }

    /// All output pins in declaration order.
    pub fn outputs(&self) -> impl Iterator<Item = &LogicalPin> {
        self.pins.iter().filter(|p| p.is_output())
    }

    /// All input pins in declaration order.
    pub fn inputs(&self) -> impl Iterator<Item = &LogicalPin> {
        self.pins.iter().filter(|p| !p.is_output())
    }

    /// Launch relay for `tube_id`, if registered.
    pub fn tube_relay(&self, tube_id: u32) -> Option<&LogicalPin> {
        self.tubes.get(&tube_id).map(|&i| &self.pins[i])
    }

    /// Registered tube ids, ascending.
    pub fn tube_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.tubes.keys().copied()
    }

    /// Motor relay for `direction`.
    pub fn motion_relay(&self, direction: AxisDirection) -> &LogicalPin {
        &self.pins[self.motion[direction.index()]]
    }

    /// Limit switch at the end of travel in `direction`.
    pub fn limit_switch(&self, direction: AxisDirection) -> &LogicalPin {
        &self.pins[self.limits[direction.index()]]
    }

    /// `(clock, data)` pins of the encoder on `axis`.
    pub fn encoder_pins(&self, axis: Axis) -> (&LogicalPin, &LogicalPin) {
        let (clock, data) = self.encoders[axis.index()];
        (&self.pins[clock], &self.pins[data])
    }
}
