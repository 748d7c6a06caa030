//! Wire encoding of logical commands

use serde::{Deserialize, Serialize};

use super::command::LogicalCommand;

/// Letter case applied to every rendered command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Casing {
    #[default]
    Lower,
    Upper,
}

/// Renders logical commands to the bytes written on the command characteristic
///
/// The encoder never validates numeric ranges; callers pre-validate
/// parameters (see [`super::form`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEncoder {
    casing: Casing,
    null_terminated: bool,
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new(Casing::Lower, true)
    }
}

impl CommandEncoder {
    pub fn new(casing: Casing, null_terminated: bool) -> Self {
        Self {
            casing,
            null_terminated,
        }
    }

    /// Command text as it goes on the wire, without terminator
    pub fn render(&self, command: &LogicalCommand) -> String {
        let text = command.to_string();
        match self.casing {
            Casing::Lower => text.to_ascii_lowercase(),
            Casing::Upper => text.to_ascii_uppercase(),
        }
    }

    /// Bytes to write, terminated by a single NUL unless disabled
    pub fn encode(&self, command: &LogicalCommand) -> Vec<u8> {
        let mut bytes = self.render(command).into_bytes();
        if self.null_terminated {
            bytes.push(0);
        }
        bytes
    }

    /// Uppercase form used in log lines
    pub fn display(&self, command: &LogicalCommand) -> String {
        command.to_string().to_ascii_uppercase()
    }
}
