//! Topic-prefixed JSON envelopes for pibridge.
//!
//! Every datagram on the wire is one envelope:
//! - a literal topic prefix naming the channel (`basecamp/script:`)
//! - immediately followed by a JSON document
//!
//! The prefix is matched as a literal string, never parsed, so the codec
//! stays bit-compatible with the flight-software counterpart. Stray NUL and
//! SOH bytes left over from the sender's socket buffer are removed first.

pub mod codec;
pub mod command;
pub mod error;
pub mod telemetry;
pub mod topic;

pub use codec::{escape_newlines, strip_control_bytes, CodecConfig, Envelope, EnvelopeCodec};
pub use command::{CommandCode, CommandEnvelope, UNDEFINED};
pub use error::{FrameError, Result};
pub use telemetry::{parse_csv_parameters, ParameterFormat, Parameters, Reading, TelemetryEnvelope};
pub use topic::{
    MatchMode, Topic, TopicTable, DEFAULT_COMMAND_PREFIX, DEFAULT_TELEMETRY_PREFIX,
};
