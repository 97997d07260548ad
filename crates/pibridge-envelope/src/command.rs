use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FrameError, Result};

/// Placeholder the counterpart writes into the unused script field.
pub const UNDEFINED: &str = "Undefined";

/// Command codes understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    /// Execute the inline `script-text`.
    RunText = 1,
    /// Execute the contents of the local file named by `script-file`.
    RunFile = 2,
}

impl CommandCode {
    /// Map a wire code to a known command, if any.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(CommandCode::RunText),
            2 => Some(CommandCode::RunFile),
            _ => None,
        }
    }

    /// Wire code of this command.
    pub fn code(self) -> i64 {
        self as i64
    }
}

/// Payload of an envelope on the command topic.
///
/// `command` keeps the raw wire integer so unknown codes survive decoding
/// and can be reported. Only the script field selected by `command` is
/// meaningful; the other is carried but never validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: i64,
    #[serde(rename = "script-file", skip_serializing_if = "Option::is_none")]
    pub script_file: Option<String>,
    #[serde(rename = "script-text", skip_serializing_if = "Option::is_none")]
    pub script_text: Option<String>,
}

impl CommandEnvelope {
    /// Build a run-text command, filling the file field with the placeholder.
    pub fn run_text(text: impl Into<String>) -> Self {
        Self {
            command: CommandCode::RunText.code(),
            script_file: Some(UNDEFINED.to_string()),
            script_text: Some(text.into()),
        }
    }

    /// Build a run-file command, filling the text field with the placeholder.
    pub fn run_file(path: impl Into<String>) -> Self {
        Self {
            command: CommandCode::RunFile.code(),
            script_file: Some(path.into()),
            script_text: Some(UNDEFINED.to_string()),
        }
    }

    /// Extract a command envelope from a decoded JSON payload.
    ///
    /// Only `command` is checked: it must be present and an integer.
    /// Script fields that are missing or not strings read as `None`.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let object = payload.as_object().ok_or_else(|| {
            FrameError::InvalidCommand(format!(
                "payload must be a JSON object, got {}",
                kind_of(payload)
            ))
        })?;

        let command = match object.get("command") {
            None => {
                return Err(FrameError::InvalidCommand(
                    "missing `command` field".to_string(),
                ))
            }
            Some(value) => value.as_i64().ok_or_else(|| {
                FrameError::InvalidCommand(format!(
                    "`command` must be an integer, got {}",
                    kind_of(value)
                ))
            })?,
        };

        let text_field = |name: &str| object.get(name).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            command,
            script_file: text_field("script-file"),
            script_text: text_field("script-text"),
        })
    }

    /// The known command this envelope carries, if any.
    pub fn code(&self) -> Option<CommandCode> {
        CommandCode::from_code(self.command)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer out of range",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
