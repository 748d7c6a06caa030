//! Command protocol shared with the rig firmware
//!
//! Commands are short ASCII strings written to the command characteristic,
//! optionally terminated by a NUL byte so the receiver can detect the end of a
//! command without a fixed-length read.

pub mod command;
pub mod encoder;
pub mod form;

pub use command::{CommandError, LogicalCommand, Seconds};
pub use encoder::{Casing, CommandEncoder};
pub use form::{form_for, FieldRule, FormError, FormSpec, FORMS};
