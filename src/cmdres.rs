//! Structured results returned by module commands.
use std::collections::BTreeMap;
use std::fmt;

/// Generic command failure.
pub const ERR_GENERIC: i32 = -2;
/// Module or command lookup failed.
pub const ERR_NOT_FOUND: i32 = -1;
/// The module gate could not be acquired in time.
pub const ERR_BUSY: i32 = -3;

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResultKind {
    None,
    Int,
    Str,
    Table,
    Object,
    Error,
}

/// Value carried by a successful command.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CmdValue {
    #[default]
    None,
    Int(i64),
    Str(String),
    /// Rows of cells, the first row holds the column names
    Table(Vec<Vec<String>>),
    Object(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CmdResult {
    pub cmdline: String,
    pub description: String,
    pub value: CmdValue,
    pub error_code: i32,
    /// Underlying failure when the command did not complete
    pub cause: Option<String>,
}

impl CmdResult {
    pub fn new(cmdline: &str, description: &str, value: CmdValue) -> Self {
        Self {
            cmdline: cmdline.to_string(),
            description: description.to_string(),
            value,
            error_code: 0,
            cause: None,
        }
    }

    pub fn none(cmdline: &str, description: &str) -> Self {
        Self::new(cmdline, description, CmdValue::None)
    }

    pub fn text(cmdline: &str, description: &str, text: impl Into<String>) -> Self {
        Self::new(cmdline, description, CmdValue::Str(text.into()))
    }

    pub fn error(cmdline: &str, description: &str, error_code: i32) -> Self {
        Self {
            error_code,
            ..Self::none(cmdline, description)
        }
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Kind of the result. Any negative error code makes it an error, whatever the value.
    pub fn kind(&self) -> ResultKind {
        if self.error_code < 0 {
            return ResultKind::Error;
        }
        match self.value {
            CmdValue::None => ResultKind::None,
            CmdValue::Int(_) => ResultKind::Int,
            CmdValue::Str(_) => ResultKind::Str,
            CmdValue::Table(_) => ResultKind::Table,
            CmdValue::Object(_) => ResultKind::Object,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind() == ResultKind::Error
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            CmdValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            CmdValue::Int(i) => Some(i),
            _ => None,
        }
    }
}

impl fmt::Display for CmdResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ResultKind::Error => {
                write!(f, "Error {}: {}", self.error_code, self.description)?;
                if let Some(cause) = &self.cause {
                    write!(f, " ({})", cause)?;
                }
                Ok(())
            }
            _ => match &self.value {
                CmdValue::None => f.write_str(&self.description),
                CmdValue::Int(i) => write!(f, "{}", i),
                CmdValue::Str(s) => f.write_str(s),
                CmdValue::Table(rows) => {
                    for row in rows {
                        writeln!(f, "{}", row.join("\t"))?;
                    }
                    Ok(())
                }
                CmdValue::Object(map) => {
                    for (key, value) in map {
                        writeln!(f, "{}: {}", key, value)?;
                    }
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_code_forces_error() {
        let mut result = CmdResult::text("print", "Buffer", "0x100");
        assert_eq!(result.kind(), ResultKind::Str);

        result.error_code = ERR_GENERIC;
        assert_eq!(result.kind(), ResultKind::Error);
        assert!(result.is_error());
    }

    #[test]
    fn display_error_with_cause() {
        let result = CmdResult::error("search x", "Command failed", ERR_GENERIC).with_cause("Invalid Argument: x");
        assert_eq!(result.to_string(), "Error -2: Command failed (Invalid Argument: x)");
    }
}
