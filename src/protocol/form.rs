//! Auto-command form rules
//!
//! The operator picks an opcode and fills in a seconds and a cycles field.
//! Which fields apply, and their bounds, depend on the opcode. Validation
//! happens here, at the input layer, so the encoder can trust its input.

use thiserror::Error;

use super::command::{LogicalCommand, Seconds};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("unknown form opcode: {0}")]
    UnknownOpcode(String),
    #[error("{field} is required for {opcode}")]
    Missing {
        field: &'static str,
        opcode: &'static str,
    },
    #[error("{field} value '{value}' is not a valid number")]
    NotANumber { field: &'static str, value: String },
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: String,
        max: String,
    },
}

/// Constraints of a single numeric field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRule {
    Disabled,
    Enabled {
        min: f64,
        max: Option<f64>,
        step: f64,
    },
}

impl FieldRule {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    fn check(&self, field: &'static str, value: f64) -> Result<(), FormError> {
        if let Self::Enabled { min, max, .. } = *self {
            let above_max = max.is_some_and(|max| value > max + f64::EPSILON);
            if value < min - f64::EPSILON || above_max {
                return Err(FormError::OutOfRange {
                    field,
                    min: min.to_string(),
                    max: max.map_or_else(|| "unbounded".to_string(), |m| m.to_string()),
                });
            }
        }
        Ok(())
    }
}

/// Form layout for one selectable opcode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormSpec {
    pub opcode: &'static str,
    /// Message logged when the opcode is selected
    pub hint: &'static str,
    pub seconds: FieldRule,
    pub cycles: FieldRule,
}

const DESCENT_SECONDS: FieldRule = FieldRule::Enabled {
    min: 0.1,
    max: Some(5.0),
    step: 0.1,
};
const CYCLE_SECONDS: FieldRule = FieldRule::Enabled {
    min: 1.0,
    max: None,
    step: 1.0,
};
const CYCLE_COUNT: FieldRule = FieldRule::Enabled {
    min: 1.0,
    max: None,
    step: 1.0,
};

const fn simple(opcode: &'static str, hint: &'static str) -> FormSpec {
    FormSpec {
        opcode,
        hint,
        seconds: FieldRule::Disabled,
        cycles: FieldRule::Disabled,
    }
}

/// Every opcode offered by the auto-command form
pub const FORMS: &[FormSpec] = &[
    FormSpec {
        opcode: "atl",
        hint: "auto-run from the near end: enter seconds and round trips",
        seconds: CYCLE_SECONDS,
        cycles: CYCLE_COUNT,
    },
    FormSpec {
        opcode: "atr",
        hint: "auto-run from the far end: enter seconds and round trips",
        seconds: CYCLE_SECONDS,
        cycles: CYCLE_COUNT,
    },
    FormSpec {
        opcode: "dows",
        hint: "short descent: seconds only",
        seconds: DESCENT_SECONDS,
        cycles: FieldRule::Disabled,
    },
    FormSpec {
        opcode: "setd",
        hint: "set descent amount: seconds only",
        seconds: DESCENT_SECONDS,
        cycles: FieldRule::Disabled,
    },
    simple("22", "move back selected"),
    simple("21", "move forward selected"),
    simple("12", "descend selected"),
    simple("11", "ascend selected"),
    simple("30", "tool on selected, keep clear of the blade"),
    simple("31", "tool off selected"),
    simple("99", "emergency stop selected"),
    simple("showlog", "device log refresh selected"),
];

/// Look up the form for an opcode (case-insensitive)
pub fn form_for(opcode: &str) -> Result<&'static FormSpec, FormError> {
    let wanted = opcode.trim().to_ascii_lowercase();
    FORMS
        .iter()
        .find(|form| form.opcode == wanted)
        .ok_or(FormError::UnknownOpcode(wanted))
}

impl FormSpec {
    /// Validate the field inputs and build the command
    ///
    /// Inputs for disabled fields are ignored.
    pub fn build(
        &self,
        seconds: Option<&str>,
        cycles: Option<&str>,
    ) -> Result<LogicalCommand, FormError> {
        let seconds = if self.seconds.is_enabled() {
            let text = required(seconds, "seconds", self.opcode)?;
            let value: f64 = text.parse().map_err(|_| FormError::NotANumber {
                field: "seconds",
                value: text.to_string(),
            })?;
            self.seconds.check("seconds", value)?;
            Some(
                Seconds::from_secs_f64(value).map_err(|_| FormError::NotANumber {
                    field: "seconds",
                    value: text.to_string(),
                })?,
            )
        } else {
            None
        };

        let cycles = if self.cycles.is_enabled() {
            let text = required(cycles, "cycles", self.opcode)?;
            let value: u32 = text.parse().map_err(|_| FormError::NotANumber {
                field: "cycles",
                value: text.to_string(),
            })?;
            self.cycles.check("cycles", f64::from(value))?;
            Some(value)
        } else {
            None
        };

        let command = match (self.opcode, seconds, cycles) {
            ("atl", Some(seconds), Some(cycles)) => {
                LogicalCommand::AutoCycleNear { seconds, cycles }
            }
            ("atr", Some(seconds), Some(cycles)) => LogicalCommand::AutoCycleFar { seconds, cycles },
            ("dows", Some(seconds), _) => LogicalCommand::TimedDescent { seconds },
            ("setd", Some(seconds), _) => LogicalCommand::SetDescentAmount { seconds },
            (opcode, _, _) => LogicalCommand::from_name(opcode)
                .map_err(|_| FormError::UnknownOpcode(opcode.to_string()))?,
        };
        Ok(command)
    }
}

fn required<'a>(
    value: Option<&'a str>,
    field: &'static str,
    opcode: &'static str,
) -> Result<&'a str, FormError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(FormError::Missing { field, opcode })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_cycle_form() {
        let form = form_for("ATL").unwrap();
        let cmd = form.build(Some("5"), Some("2")).unwrap();
        assert_eq!(cmd, LogicalCommand::AutoCycleNear { seconds: Seconds::whole(5), cycles: 2 });

        assert!(matches!(
            form.build(Some("5"), None),
            Err(FormError::Missing { field: "cycles", .. })
        ));
        assert!(matches!(
            form.build(Some("0"), Some("2")),
            Err(FormError::OutOfRange { field: "seconds", .. })
        ));
        assert!(matches!(
            form.build(Some("5"), Some("1.5")),
            Err(FormError::NotANumber { field: "cycles", .. })
        ));
    }

    #[test]
    fn test_descent_bounds() {
        let form = form_for("dows").unwrap();
        assert!(!form.cycles.is_enabled());
        assert_eq!(
            form.build(Some("0.1"), Some("ignored")).unwrap(),
            LogicalCommand::TimedDescent { seconds: Seconds::from_millis(100) }
        );
        assert!(form.build(Some("5"), None).is_ok());
        assert!(form.build(Some("5.1"), None).is_err());
        assert!(form.build(Some("0.05"), None).is_err());
    }

    #[test]
    fn test_simple_opcodes_ignore_fields() {
        let form = form_for("30").unwrap();
        assert_eq!(form.build(Some("9"), Some("9")).unwrap(), LogicalCommand::ToolOn);
        assert_eq!(form_for("showlog").unwrap().build(None, None).unwrap(), LogicalCommand::ShowLog);
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(form_for("zz"), Err(FormError::UnknownOpcode("zz".to_string())));
    }
}
