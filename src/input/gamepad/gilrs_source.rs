//! Gamepad source backed by gilrs
//!
//! Face buttons are named by physical position in Xbox terms, assuming the
//! Nintendo layout most third-party pads report:
//!
//! ```text
//!       [x/North]
//!   [y/West] [a/East]
//!       [b/South]
//! ```

use anyhow::{anyhow, Result};
use gilrs::{Axis, Button, Gilrs};
use tracing::{debug, info};

use super::source::{GamepadSnapshot, GamepadSource};

const BUTTONS: &[Button] = &[
    Button::East,
    Button::South,
    Button::North,
    Button::West,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
];

const AXES: &[Axis] = &[
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::RightStickX,
    Axis::RightStickY,
];

/// Binding name of a gilrs button
pub fn button_name(button: Button) -> Option<&'static str> {
    match button {
        Button::East => Some("a"),
        Button::South => Some("b"),
        Button::North => Some("x"),
        Button::West => Some("y"),
        Button::LeftTrigger => Some("lb"),
        Button::RightTrigger => Some("rb"),
        Button::LeftTrigger2 => Some("lt"),
        Button::RightTrigger2 => Some("rt"),
        Button::Select => Some("minus"),
        Button::Start => Some("plus"),
        Button::Mode => Some("home"),
        Button::LeftThumb => Some("l3"),
        Button::RightThumb => Some("r3"),
        Button::DPadUp => Some("dpad.up"),
        Button::DPadDown => Some("dpad.down"),
        Button::DPadLeft => Some("dpad.left"),
        Button::DPadRight => Some("dpad.right"),
        _ => None,
    }
}

/// Binding name of a gilrs axis
pub fn axis_name(axis: Axis) -> Option<&'static str> {
    match axis {
        Axis::LeftStickX => Some("lx"),
        Axis::LeftStickY => Some("ly"),
        Axis::RightStickX => Some("rx"),
        Axis::RightStickY => Some("ry"),
        _ => None,
    }
}

/// Reads the first connected gamepad
///
/// `Gilrs` is not `Send`; the source lives on the task that created it.
pub struct GilrsSource {
    gilrs: Gilrs,
    announced: Option<String>,
}

impl GilrsSource {
    pub fn new() -> Result<Self> {
        let gilrs = Gilrs::new().map_err(|e| anyhow!("Failed to initialize gilrs: {}", e))?;
        info!("gilrs initialized");
        Ok(Self {
            gilrs,
            announced: None,
        })
    }
}

impl GamepadSource for GilrsSource {
    fn name(&self) -> &str {
        "gilrs"
    }

    fn poll(&mut self) -> Option<GamepadSnapshot> {
        // Pump the queue so connection and state caches stay current
        while let Some(event) = self.gilrs.next_event() {
            debug!("gilrs event: {:?}", event.event);
        }

        let pad = self
            .gilrs
            .gamepads()
            .find(|(_, pad)| pad.is_connected())
            .map(|(_, pad)| pad);

        let Some(pad) = pad else {
            if let Some(name) = self.announced.take() {
                info!("Gamepad disconnected: {}", name);
            }
            return None;
        };

        if self.announced.as_deref() != Some(pad.name()) {
            info!("Gamepad connected: {}", pad.name());
            self.announced = Some(pad.name().to_string());
        }

        let mut snapshot = GamepadSnapshot::default();
        for &button in BUTTONS {
            if let Some(name) = button_name(button) {
                snapshot.buttons.insert(name.to_string(), pad.is_pressed(button));
            }
        }
        for &axis in AXES {
            if let Some(name) = axis_name(axis) {
                snapshot.axes.insert(name.to_string(), pad.value(axis));
            }
        }
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_buttons_nintendo_layout() {
        assert_eq!(button_name(Button::East), Some("a"));
        assert_eq!(button_name(Button::South), Some("b"));
        assert_eq!(button_name(Button::North), Some("x"));
        assert_eq!(button_name(Button::West), Some("y"));
    }

    #[test]
    fn test_dpad_and_axes() {
        assert_eq!(button_name(Button::DPadUp), Some("dpad.up"));
        assert_eq!(button_name(Button::DPadRight), Some("dpad.right"));
        assert_eq!(axis_name(Axis::LeftStickY), Some("ly"));
        assert_eq!(axis_name(Axis::LeftZ), None);
    }

    #[test]
    fn test_every_polled_button_has_a_name() {
        assert!(BUTTONS.iter().all(|b| button_name(*b).is_some()));
        assert!(AXES.iter().all(|a| axis_name(*a).is_some()));
    }
}
