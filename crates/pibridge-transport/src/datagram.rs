use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

/// Largest payload a single UDP/IPv4 datagram can carry.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Default maximum datagram size: 4 KiB.
pub const DEFAULT_MAX_DATAGRAM: usize = 4 * 1024;

/// One inbound datagram and the address it came from.
#[derive(Debug, Clone)]
pub struct Datagram {
    /// Raw payload bytes, exactly as received.
    pub payload: Bytes,
    /// Sender address.
    pub source: SocketAddr,
}

impl Datagram {
    /// Create a new datagram.
    pub fn new(payload: impl Into<Bytes>, source: SocketAddr) -> Self {
        Self {
            payload: payload.into(),
            source,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True for a zero-length datagram.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Configuration shared by both sockets.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum datagram size in bytes. Default: 4 KiB.
    pub max_datagram_size: usize,
    /// Bounded wait for one inbound datagram. `None` blocks indefinitely.
    pub receive_timeout: Option<Duration>,
    /// Set `SO_REUSEADDR` on the receive socket before binding.
    pub reuse_address: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: DEFAULT_MAX_DATAGRAM,
            receive_timeout: Some(Duration::from_secs(1)),
            reuse_address: true,
        }
    }
}
