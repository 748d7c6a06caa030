//! Input arbitrator
//!
//! Turns raw activate/deactivate transitions into at most one logical command
//! each. Repeated activations of a held input (key auto-repeat, a gamepad
//! button seen pressed on consecutive polls) are ignored.

use std::collections::HashMap;
use tracing::trace;

use super::bindings::{BindingTable, InputId};
use crate::protocol::LogicalCommand;

#[derive(Debug, Default)]
pub struct InputArbitrator {
    bindings: BindingTable,
    /// Held inputs and the release command captured at press time
    held: HashMap<InputId, Option<LogicalCommand>>,
}

impl InputArbitrator {
    pub fn new(bindings: BindingTable) -> Self {
        Self {
            bindings,
            held: HashMap::new(),
        }
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Swap the binding table; held inputs keep the release they were pressed with
    pub fn set_bindings(&mut self, bindings: BindingTable) {
        self.bindings = bindings;
    }

    pub fn is_held(&self, input: &InputId) -> bool {
        self.held.contains_key(input)
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Press/keydown/button-down; returns the press command if this is a new press
    pub fn activate(&mut self, input: &InputId) -> Option<LogicalCommand> {
        if self.held.contains_key(input) {
            trace!("{} already held", input);
            return None;
        }
        let binding = self.bindings.get(input)?;
        let press = binding.press.clone();
        self.held.insert(input.clone(), binding.release.clone());
        Some(press)
    }

    /// Release/keyup/button-up; returns the release command of a continuous binding
    pub fn deactivate(&mut self, input: &InputId) -> Option<LogicalCommand> {
        self.held.remove(input).flatten()
    }

    /// Release every held input matching `filter`, returning their release commands
    pub fn release_all(&mut self, filter: impl Fn(&InputId) -> bool) -> Vec<LogicalCommand> {
        let mut released: Vec<InputId> = self.held.keys().filter(|id| filter(id)).cloned().collect();
        released.sort();
        released
            .iter()
            .filter_map(|id| self.held.remove(id).flatten())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::bindings::default_keypad;
    use proptest::prelude::*;

    fn keypad() -> InputArbitrator {
        let mut table = BindingTable::new();
        for (key, command) in default_keypad() {
            table.bind(InputId::key(&key), command);
        }
        InputArbitrator::new(table)
    }

    #[test]
    fn test_continuous_press_release_pair() {
        let mut arb = keypad();
        let up = InputId::key("8");

        assert_eq!(arb.activate(&up), Some(LogicalCommand::Ascend));
        assert_eq!(arb.deactivate(&up), Some(LogicalCommand::AxisStop));
        assert!(!arb.is_held(&up));
    }

    #[test]
    fn test_repeat_while_held_is_ignored() {
        let mut arb = keypad();
        let down = InputId::key("2");

        assert_eq!(arb.activate(&down), Some(LogicalCommand::Descend));
        assert_eq!(arb.activate(&down), None);
        assert_eq!(arb.activate(&down), None);
        assert_eq!(arb.deactivate(&down), Some(LogicalCommand::AxisStop));
        assert_eq!(arb.deactivate(&down), None);
    }

    #[test]
    fn test_momentary_and_travel_release_emit_nothing() {
        let mut arb = keypad();

        for key in ["5", "0", "3", "6", "4"] {
            let id = InputId::key(key);
            assert!(arb.activate(&id).is_some(), "key {}", key);
            assert_eq!(arb.deactivate(&id), None, "key {}", key);
        }
    }

    #[test]
    fn test_unbound_inputs_are_not_held() {
        let mut arb = keypad();
        let id = InputId::key("Q");

        assert_eq!(arb.activate(&id), None);
        assert!(!arb.is_held(&id));
        assert_eq!(arb.deactivate(&id), None);
    }

    #[test]
    fn test_release_captured_at_press_time() {
        let mut arb = keypad();
        let id = InputId::key("8");
        arb.activate(&id);

        // Rebinding while held must not orphan the stop
        arb.set_bindings(BindingTable::new());
        assert_eq!(arb.deactivate(&id), Some(LogicalCommand::AxisStop));
    }

    #[test]
    fn test_release_all() {
        let mut table = BindingTable::new();
        table.bind(InputId::key("8"), LogicalCommand::Ascend);
        table.bind(InputId::button("dpad.down"), LogicalCommand::Descend);
        table.bind(InputId::button("a"), LogicalCommand::FullStop);
        let mut arb = InputArbitrator::new(table);

        arb.activate(&InputId::key("8"));
        arb.activate(&InputId::button("dpad.down"));
        arb.activate(&InputId::button("a"));

        let released = arb.release_all(InputId::is_gamepad);
        assert_eq!(released, vec![LogicalCommand::AxisStop]);
        assert_eq!(arb.held_count(), 1);
        assert!(arb.is_held(&InputId::key("8")));
    }

    proptest! {
        /// Presses never exceed the number of activations that follow a release
        #[test]
        fn prop_press_count_bounded_by_transitions(events in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut arb = keypad();
            let id = InputId::key("8");
            let mut held = false;
            let mut transitions = 0;
            let mut presses = 0;
            let mut releases = 0;

            for activate in events {
                if activate {
                    if !held {
                        transitions += 1;
                    }
                    held = true;
                    if arb.activate(&id).is_some() {
                        presses += 1;
                    }
                } else {
                    held = false;
                    if arb.deactivate(&id).is_some() {
                        releases += 1;
                    }
                }
            }

            prop_assert_eq!(presses, transitions);
            prop_assert!(releases <= presses);
        }
    }
}
