//! Gamepad input
//!
//! Sources are polled on a fixed tick; the poller turns snapshots into
//! press/release edges for the arbitrator.

#[cfg(feature = "gamepad")]
pub mod gilrs_source;
pub mod source;

#[cfg(feature = "gamepad")]
pub use gilrs_source::GilrsSource;
pub use source::{axis_bucket, GamepadPoller, GamepadSnapshot, GamepadSource, GamepadTransition, NoGamepad};

use tracing::warn;

/// Open the platform gamepad source, falling back to [`NoGamepad`]
pub fn open_source(enabled: bool) -> Box<dyn GamepadSource> {
    if !enabled {
        return Box::new(NoGamepad);
    }

    #[cfg(feature = "gamepad")]
    {
        match GilrsSource::new() {
            Ok(source) => return Box::new(source),
            Err(e) => warn!("Gamepad input unavailable: {:#}", e),
        }
    }
    #[cfg(not(feature = "gamepad"))]
    warn!("Gamepad input requested but this build has no gamepad support");

    Box::new(NoGamepad)
}
