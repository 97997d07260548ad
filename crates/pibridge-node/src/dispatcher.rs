use std::fmt;
use std::path::Path;

use pibridge_envelope::{CommandCode, CommandEnvelope};

use crate::executor::{ExecutionReport, ScriptExecutor};

/// Where a command failed after it was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    /// Reading the script file named by a run-file command.
    ReadScript,
    /// Running the script.
    Execute,
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStage::ReadScript => f.write_str("read-script"),
            ExecutionStage::Execute => f.write_str("execute"),
        }
    }
}

/// Result of handling one inbound datagram.
///
/// Every variant is terminal for that datagram; none stops the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The script ran to a successful exit.
    Executed {
        code: CommandCode,
        report: ExecutionReport,
    },
    /// The datagram does not carry the command topic.
    TopicMismatch,
    /// Not UTF-8, not JSON, or missing a required field.
    MalformedPayload(String),
    /// A well-formed envelope with a command code nobody handles.
    UnknownCommand(i64),
    /// The script could not be read or did not run successfully.
    ExecutionError {
        stage: ExecutionStage,
        message: String,
    },
}

impl Outcome {
    /// Stable short name for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Executed { .. } => "executed",
            Outcome::TopicMismatch => "topic-mismatch",
            Outcome::MalformedPayload(_) => "malformed-payload",
            Outcome::UnknownCommand(_) => "unknown-command",
            Outcome::ExecutionError { .. } => "execution-error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Executed { .. })
    }
}

/// Routes decoded command envelopes to the script executor.
///
/// Runs one command to completion before returning.
#[derive(Debug)]
pub struct Dispatcher<E> {
    executor: E,
}

impl<E: ScriptExecutor> Dispatcher<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Route one command.
    ///
    /// Only the script field selected by the command code is consulted.
    pub fn dispatch(&mut self, envelope: &CommandEnvelope) -> Outcome {
        let Some(code) = envelope.code() else {
            return Outcome::UnknownCommand(envelope.command);
        };

        let script = match code {
            CommandCode::RunText => match envelope.script_text.as_deref() {
                Some(text) => text.to_string(),
                None => {
                    return Outcome::MalformedPayload(
                        "run-text command without string `script-text`".to_string(),
                    )
                }
            },
            CommandCode::RunFile => {
                let Some(path) = envelope.script_file.as_deref() else {
                    return Outcome::MalformedPayload(
                        "run-file command without string `script-file`".to_string(),
                    );
                };
                match read_script(Path::new(path)) {
                    Ok(text) => text,
                    Err(message) => {
                        return Outcome::ExecutionError {
                            stage: ExecutionStage::ReadScript,
                            message,
                        }
                    }
                }
            }
        };

        tracing::debug!(code = code.code(), script_len = script.len(), "executing script");
        match self.executor.execute(&script) {
            Ok(report) => Outcome::Executed { code, report },
            Err(err) => Outcome::ExecutionError {
                stage: ExecutionStage::Execute,
                message: err.to_string(),
            },
        }
    }
}

fn read_script(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))
}
