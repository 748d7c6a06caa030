//! Static binding table from raw inputs to logical commands

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::config::{GamepadConfig, KeyboardConfig};
use crate::protocol::LogicalCommand;

/// Direction bucket of an analog axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AxisDirection {
    Positive,
    Negative,
}

/// Raw input identifier; the held map is keyed by it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputId {
    Key(String),
    Pointer(String),
    GamepadButton(String),
    GamepadAxis {
        axis: String,
        direction: AxisDirection,
    },
}

impl InputId {
    /// Keyboard key, case-normalised
    pub fn key(name: &str) -> Self {
        Self::Key(name.trim().to_uppercase())
    }

    pub fn pointer(target: &str) -> Self {
        Self::Pointer(target.trim().to_ascii_lowercase())
    }

    pub fn button(name: &str) -> Self {
        Self::GamepadButton(name.trim().to_ascii_lowercase())
    }

    pub fn axis(name: &str, direction: AxisDirection) -> Self {
        Self::GamepadAxis {
            axis: name.trim().to_ascii_lowercase(),
            direction,
        }
    }

    pub fn is_gamepad(&self) -> bool {
        matches!(self, Self::GamepadButton(_) | Self::GamepadAxis { .. })
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "key.{}", key),
            Self::Pointer(target) => write!(f, "pointer.{}", target),
            Self::GamepadButton(name) => write!(f, "gamepad.btn.{}", name),
            Self::GamepadAxis { axis, direction } => {
                let sign = match direction {
                    AxisDirection::Positive => '+',
                    AxisDirection::Negative => '-',
                };
                write!(f, "gamepad.axis.{}{}", axis, sign)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBinding {
    pub input: InputId,
    pub press: LogicalCommand,
    /// Present only for continuous commands
    pub release: Option<LogicalCommand>,
}

impl InputBinding {
    pub fn new(input: InputId, press: LogicalCommand) -> Self {
        let release = press.release_command();
        Self {
            input,
            press,
            release,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    bindings: HashMap<InputId, InputBinding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, input: InputId, press: LogicalCommand) {
        self.bindings
            .insert(input.clone(), InputBinding::new(input, press));
    }

    pub fn get(&self, input: &InputId) -> Option<&InputBinding> {
        self.bindings.get(input)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Gamepad buttons with a binding, sorted
    pub fn gamepad_buttons(&self) -> BTreeSet<String> {
        self.bindings
            .keys()
            .filter_map(|id| match id {
                InputId::GamepadButton(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Gamepad axes with at least one bound direction, sorted
    pub fn gamepad_axes(&self) -> BTreeSet<String> {
        self.bindings
            .keys()
            .filter_map(|id| match id {
                InputId::GamepadAxis { axis, .. } => Some(axis.clone()),
                _ => None,
            })
            .collect()
    }

    /// Build the table from keyboard and gamepad configuration
    ///
    /// Panel buttons are always bound.
    pub fn from_config(keyboard: &KeyboardConfig, gamepad: &GamepadConfig) -> Self {
        let mut table = Self::new();
        for (target, command) in panel_buttons() {
            table.bind(InputId::pointer(target), command);
        }
        for (key, command) in &keyboard.bindings {
            table.bind(InputId::key(key), command.clone());
        }
        if gamepad.enabled {
            for (button, command) in &gamepad.buttons {
                table.bind(InputId::button(button), command.clone());
            }
            for axis in &gamepad.axes {
                if let Some(command) = &axis.positive {
                    table.bind(InputId::axis(&axis.axis, AxisDirection::Positive), command.clone());
                }
                if let Some(command) = &axis.negative {
                    table.bind(InputId::axis(&axis.axis, AxisDirection::Negative), command.clone());
                }
            }
        }
        table
    }
}

/// On-screen buttons of the panel, addressed by pointer target name
pub fn panel_buttons() -> Vec<(&'static str, LogicalCommand)> {
    vec![
        ("up", LogicalCommand::Ascend),
        ("down", LogicalCommand::Descend),
        ("forward", LogicalCommand::Forward),
        ("back", LogicalCommand::Back),
        ("stop", LogicalCommand::FullStop),
        ("estop", LogicalCommand::EmergencyStop),
        ("tool-on", LogicalCommand::ToolOn),
        ("tool-off", LogicalCommand::ToolOff),
    ]
}

/// Numeric keypad layout of the panel
pub fn default_keypad() -> BTreeMap<String, LogicalCommand> {
    use crate::protocol::Seconds;

    BTreeMap::from([
        ("8".to_string(), LogicalCommand::Ascend),
        ("2".to_string(), LogicalCommand::Descend),
        ("6".to_string(), LogicalCommand::Forward),
        ("4".to_string(), LogicalCommand::Back),
        ("5".to_string(), LogicalCommand::FullStop),
        (
            "3".to_string(),
            LogicalCommand::TimedDescent {
                seconds: Seconds::from_millis(500),
            },
        ),
        ("0".to_string(), LogicalCommand::EmergencyStop),
    ])
}
