use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in bridge node operations.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pibridge_transport::TransportError),

    /// Envelope encode/decode error.
    #[error("envelope error: {0}")]
    Frame(#[from] pibridge_envelope::FrameError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Script execution error.
    #[error("execution error: {0}")]
    Exec(#[from] ExecError),

    /// Sensor collaborator error.
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// I/O error outside the sockets (thread spawn, file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A loop thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config text is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A duration string could not be parsed.
    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    /// A value is out of range or inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors reported by a [`crate::ScriptExecutor`].
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The interpreter process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The script ran and exited unsuccessfully.
    #[error("script exited with {}: {stderr}", describe_exit(.exit_code))]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The script exceeded the configured execution timeout and was killed.
    #[error("script timed out after {0:?}")]
    TimedOut(Duration),

    /// Waiting on the interpreter failed.
    #[error("executor I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a [`crate::SensorSource`].
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// The sensor adapter could not be started.
    #[error("failed to start sensor adapter {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The sensor adapter exited unsuccessfully.
    #[error("sensor adapter exited with {}: {stderr}", describe_exit(.exit_code))]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The sensor adapter printed something that is not a sample.
    #[error("invalid sensor output: {0}")]
    InvalidOutput(String),

    /// The hardware or simulation could not produce a reading.
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
