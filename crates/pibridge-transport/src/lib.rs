//! Datagram transport for pibridge.
//!
//! Owns the two UDP sockets the bridge uses:
//! - a bound receive socket with a bounded wait, for inbound commands
//! - an ephemeral send socket aimed at a fixed destination, for telemetry
//!
//! The framing unit is a single datagram whose size is capped by
//! [`TransportConfig::max_datagram_size`]. Everything else builds on top
//! of the [`Datagram`] type provided here.

pub mod datagram;
pub mod error;
pub mod udp;

pub use datagram::{Datagram, TransportConfig, DEFAULT_MAX_DATAGRAM, MAX_UDP_PAYLOAD};
pub use error::{Result, TransportError};
pub use udp::{DatagramReceiver, DatagramSender};
