//! Logical commands understood by the rig firmware
//!
//! Every button, key and gamepad binding resolves to one [`LogicalCommand`].
//! The enum is closed: opcodes only exist as the wire rendering of a variant,
//! except for [`LogicalCommand::Raw`] which carries free text typed by the
//! operator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while constructing a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("command text is empty")]
    Empty,
    #[error("command text contains a NUL byte")]
    EmbeddedNul,
    #[error("invalid seconds value: {0}")]
    InvalidSeconds(String),
    #[error("unknown command name: {0}")]
    UnknownName(String),
}

/// A non-negative duration with millisecond resolution, as typed by the operator
///
/// Rendered without trailing zeros so `0.5` stays `0.5` and `5` stays `5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seconds(u32);

impl Seconds {
    /// Whole seconds
    pub const fn whole(secs: u32) -> Self {
        Self(secs.saturating_mul(1000))
    }

    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    pub fn from_secs_f64(secs: f64) -> Result<Self, CommandError> {
        if !secs.is_finite() || secs < 0.0 || secs * 1000.0 > f64::from(u32::MAX) {
            return Err(CommandError::InvalidSeconds(secs.to_string()));
        }
        Ok(Self((secs * 1000.0).round() as u32))
    }

    pub const fn millis(self) -> u32 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        f64::from(self.0) / 1000.0
    }
}

impl FromStr for Seconds {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| CommandError::InvalidSeconds(trimmed.to_string()))?;
        Self::from_secs_f64(value)
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 1000;
        let frac = self.0 % 1000;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let frac = format!("{:03}", frac);
        write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
    }
}

/// A logical action sent to the rig
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogicalCommand {
    Ascend,
    Descend,
    Forward,
    Back,
    /// Stop vertical motion only
    AxisStop,
    FullStop,
    EmergencyStop,
    ToolOn,
    ToolOff,
    ShowLog,
    Restart,
    TimedDescent { seconds: Seconds },
    SetDescentAmount { seconds: Seconds },
    /// Auto-cycle starting from the far end
    AutoCycleFar { seconds: Seconds, cycles: u32 },
    /// Auto-cycle starting from the near end
    AutoCycleNear { seconds: Seconds, cycles: u32 },
    /// Free text passed through to the firmware
    Raw(String),
}

impl LogicalCommand {
    /// Build a free-text command, trimmed
    pub fn raw(text: &str) -> Result<Self, CommandError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CommandError::Empty);
        }
        if trimmed.contains('\0') {
            return Err(CommandError::EmbeddedNul);
        }
        Ok(Self::Raw(trimmed.to_string()))
    }

    /// Opcode prefix of this command
    pub fn opcode(&self) -> &str {
        match self {
            Self::Ascend => "11",
            Self::Descend => "12",
            Self::Forward => "21",
            Self::Back => "22",
            Self::AxisStop => "10",
            Self::FullStop => "93",
            Self::EmergencyStop => "99",
            Self::ToolOn => "30",
            Self::ToolOff => "31",
            Self::ShowLog => "showlog",
            Self::Restart => "restart",
            Self::TimedDescent { .. } => "dows",
            Self::SetDescentAmount { .. } => "setd",
            Self::AutoCycleFar { .. } => "atr",
            Self::AutoCycleNear { .. } => "atl",
            Self::Raw(text) => text,
        }
    }

    /// Commands whose control is held down and stopped on release
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Ascend | Self::Descend | Self::Forward | Self::Back)
    }

    /// Command sent when a held binding for this command is released
    ///
    /// Vertical motion stops with the axis-stop code. Horizontal travel is
    /// fire-and-forget: the carriage runs until an explicit stop.
    pub fn release_command(&self) -> Option<LogicalCommand> {
        match self {
            Self::Ascend | Self::Descend => Some(Self::AxisStop),
            _ => None,
        }
    }

    /// Forward or back travel, which starts the run timer
    pub fn is_movement_start(&self) -> bool {
        matches!(self, Self::Forward | Self::Back)
    }

    pub fn is_full_stop(&self) -> bool {
        matches!(self, Self::FullStop)
    }

    /// Resolve a human-readable name (config files, REPL) or wire text
    pub fn from_name(name: &str) -> Result<Self, CommandError> {
        let key = name.trim().to_ascii_lowercase().replace('_', "-");
        let command = match key.as_str() {
            "" => return Err(CommandError::Empty),
            "ascend" | "up" | "raise" => Self::Ascend,
            "descend" | "down" | "lower" => Self::Descend,
            "forward" | "far" | "right" => Self::Forward,
            "back" | "near" | "left" => Self::Back,
            "axis-stop" | "vstop" => Self::AxisStop,
            "stop" | "full-stop" => Self::FullStop,
            "estop" | "emergency-stop" | "emergency" => Self::EmergencyStop,
            "tool-on" | "saw-on" => Self::ToolOn,
            "tool-off" | "saw-off" => Self::ToolOff,
            "log-refresh" => Self::ShowLog,
            _ => match parse_wire(&key) {
                Some(command) => command,
                None => return Err(CommandError::UnknownName(name.trim().to_string())),
            },
        };
        Ok(command)
    }
}

/// Parse lowercase wire text into a structured command
fn parse_wire(text: &str) -> Option<LogicalCommand> {
    let simple = match text {
        "11" => Some(LogicalCommand::Ascend),
        "12" => Some(LogicalCommand::Descend),
        "21" => Some(LogicalCommand::Forward),
        "22" => Some(LogicalCommand::Back),
        "10" => Some(LogicalCommand::AxisStop),
        "93" => Some(LogicalCommand::FullStop),
        "99" => Some(LogicalCommand::EmergencyStop),
        "30" => Some(LogicalCommand::ToolOn),
        "31" => Some(LogicalCommand::ToolOff),
        "showlog" => Some(LogicalCommand::ShowLog),
        "restart" => Some(LogicalCommand::Restart),
        _ => None,
    };
    if simple.is_some() {
        return simple;
    }

    if let Some(rest) = text.strip_prefix("dows") {
        return parse_seconds_field(rest).map(|seconds| LogicalCommand::TimedDescent { seconds });
    }
    if let Some(rest) = text.strip_prefix("setd") {
        return parse_seconds_field(rest)
            .map(|seconds| LogicalCommand::SetDescentAmount { seconds });
    }
    if let Some(rest) = text.strip_prefix("atr") {
        return parse_cycle_fields(rest)
            .map(|(seconds, cycles)| LogicalCommand::AutoCycleFar { seconds, cycles });
    }
    if let Some(rest) = text.strip_prefix("atl") {
        return parse_cycle_fields(rest)
            .map(|(seconds, cycles)| LogicalCommand::AutoCycleNear { seconds, cycles });
    }
    None
}

/// `0.5` or `0.5s`
fn parse_seconds_field(rest: &str) -> Option<Seconds> {
    let digits = rest.strip_suffix('s').unwrap_or(rest);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    digits.parse().ok()
}

/// `5s2c`
fn parse_cycle_fields(rest: &str) -> Option<(Seconds, u32)> {
    let (secs, cycles) = rest.split_once('s')?;
    let cycles = cycles.strip_suffix('c')?;
    let seconds = parse_seconds_field(secs)?;
    if cycles.is_empty() || !cycles.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((seconds, cycles.parse().ok()?))
}

impl FromStr for LogicalCommand {
    type Err = CommandError;

    /// Parse wire text, case-insensitive; unknown text becomes [`LogicalCommand::Raw`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = Self::raw(s)?;
        let lowered = s.trim().to_ascii_lowercase();
        Ok(parse_wire(&lowered).unwrap_or(raw))
    }
}

impl fmt::Display for LogicalCommand {
    /// Lowercase wire text without terminator
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedDescent { seconds } | Self::SetDescentAmount { seconds } => {
                write!(f, "{}{}s", self.opcode(), seconds)
            }
            Self::AutoCycleFar { seconds, cycles } | Self::AutoCycleNear { seconds, cycles } => {
                write!(f, "{}{}s{}c", self.opcode(), seconds, cycles)
            }
            _ => f.write_str(self.opcode()),
        }
    }
}

impl TryFrom<String> for LogicalCommand {
    type Error = CommandError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

impl From<LogicalCommand> for String {
    fn from(command: LogicalCommand) -> Self {
        command.to_string()
    }
}
