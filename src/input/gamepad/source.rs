//! Gamepad polling: snapshots, the source seam and transition detection

use std::collections::{BTreeMap, BTreeSet};

use crate::input::bindings::{AxisDirection, InputId};

/// Instantaneous state of one gamepad
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadSnapshot {
    /// Button name → pressed
    pub buttons: BTreeMap<String, bool>,
    /// Axis name → value in -1.0..=1.0
    pub axes: BTreeMap<String, f32>,
}

impl GamepadSnapshot {
    pub fn with_button(mut self, name: &str, pressed: bool) -> Self {
        self.buttons.insert(name.to_string(), pressed);
        self
    }

    pub fn with_axis(mut self, name: &str, value: f32) -> Self {
        self.axes.insert(name.to_string(), value);
        self
    }
}

/// Something that can be polled for the state of the first connected gamepad
///
/// Returns `None` while no pad is present.
pub trait GamepadSource {
    fn name(&self) -> &str;
    fn poll(&mut self) -> Option<GamepadSnapshot>;
}

/// Source used when gamepad support is disabled or unavailable
#[derive(Debug, Default)]
pub struct NoGamepad;

impl GamepadSource for NoGamepad {
    fn name(&self) -> &str {
        "none"
    }

    fn poll(&mut self) -> Option<GamepadSnapshot> {
        None
    }
}

/// One edge detected between two polls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GamepadTransition {
    Pressed(InputId),
    Released(InputId),
}

/// Bucket an axis value against the threshold
pub fn axis_bucket(value: f32, threshold: f32) -> Option<AxisDirection> {
    if value > threshold {
        Some(AxisDirection::Positive)
    } else if value < -threshold {
        Some(AxisDirection::Negative)
    } else {
        None
    }
}

/// Turns successive snapshots into press/release edges
#[derive(Debug)]
pub struct GamepadPoller {
    threshold: f32,
    active: BTreeSet<InputId>,
    present: bool,
}

impl GamepadPoller {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            active: BTreeSet::new(),
            present: false,
        }
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    fn active_inputs(&self, snapshot: &GamepadSnapshot) -> BTreeSet<InputId> {
        let buttons = snapshot
            .buttons
            .iter()
            .filter(|(_, pressed)| **pressed)
            .map(|(name, _)| InputId::button(name));
        let axes = snapshot.axes.iter().filter_map(|(name, value)| {
            axis_bucket(*value, self.threshold).map(|dir| InputId::axis(name, dir))
        });
        buttons.chain(axes).collect()
    }

    /// Compare a poll result with the previous one
    ///
    /// Releases are reported before presses so an axis flipping sides in one
    /// tick stops before it starts again. A missing pad releases everything.
    pub fn update(&mut self, snapshot: Option<&GamepadSnapshot>) -> Vec<GamepadTransition> {
        self.present = snapshot.is_some();
        let current = snapshot.map(|s| self.active_inputs(s)).unwrap_or_default();

        let released = self
            .active
            .difference(&current)
            .cloned()
            .map(GamepadTransition::Released);
        let pressed = current
            .difference(&self.active)
            .cloned()
            .map(GamepadTransition::Pressed);
        let transitions = released.chain(pressed).collect();

        self.active = current;
        transitions
    }
}
