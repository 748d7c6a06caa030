//! Input arbitration
//!
//! Keyboard keys, pointer targets and gamepad buttons/axes are bound to
//! logical commands. The arbitrator keeps the set of held inputs so that each
//! physical press issues its command once and each release issues at most one
//! stop.

pub mod arbitrator;
pub mod bindings;
pub mod gamepad;

pub use arbitrator::InputArbitrator;
pub use bindings::{default_keypad, panel_buttons, AxisDirection, BindingTable, InputBinding, InputId};
pub use gamepad::{GamepadPoller, GamepadSnapshot, GamepadSource, GamepadTransition};
