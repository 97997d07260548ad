//! UDP bridge between flight software and a script-running compute node.
//!
//! Commands arrive as topic-prefixed JSON datagrams and are handed to a
//! script executor; sensor samples leave as topic-prefixed JSON telemetry.
//!
//! # Crate Structure
//!
//! - [`transport`]: UDP receive and send sockets
//! - [`envelope`]: Topic-prefixed JSON envelope codec
//! - [`node`]: Dispatcher, publisher and the two bridge loops (behind `node` feature)

/// Re-export transport types.
pub mod transport {
    pub use pibridge_transport::*;
}

/// Re-export envelope types.
pub mod envelope {
    pub use pibridge_envelope::*;
}

/// Re-export node types (requires `node` feature).
#[cfg(feature = "node")]
pub mod node {
    pub use pibridge_node::*;
}
