/// Errors that can occur during envelope encoding/decoding.
///
/// Every decode variant is a malformed payload from the dispatcher's point
/// of view. Traffic for another topic is not an error and never shows up
/// here; decoders report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload is not valid UTF-8 after control bytes were removed.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The text after the topic prefix is not valid JSON.
    #[error("malformed JSON payload: {0}")]
    MalformedJson(#[source] serde_json::Error),

    /// The JSON is valid but is not a usable command envelope.
    #[error("invalid command envelope: {0}")]
    InvalidCommand(String),

    /// The JSON is valid but is not a usable telemetry envelope.
    #[error("invalid telemetry envelope: {0}")]
    InvalidTelemetry(String),

    /// A flat parameter string could not be split into name/value pairs.
    #[error("invalid parameter list: {0}")]
    InvalidParameters(String),

    /// An outgoing payload could not be serialised.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
