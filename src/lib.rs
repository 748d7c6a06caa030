//! Remote control panel for a wireless carriage rig
//!
//! Encodes operator intents into the rig's ASCII command protocol, manages
//! the wireless link, arbitrates keyboard, pointer and gamepad input, and
//! times carriage runs.

pub mod cli;
pub mod config;
pub mod controller;
pub mod input;
pub mod logger;
pub mod paths;
pub mod protocol;
pub mod session;
pub mod timer;
pub mod transport;
