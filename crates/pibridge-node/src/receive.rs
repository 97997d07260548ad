use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pibridge_envelope::EnvelopeCodec;
use pibridge_transport::{DatagramReceiver, TransportError};

use crate::dispatcher::{Dispatcher, Outcome};
use crate::events::{BridgeEvent, EventSink};
use crate::executor::ScriptExecutor;
use crate::shutdown::ShutdownFlag;

/// Where the receive loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    /// Sleeping after an empty wait or a socket error.
    Idle,
    /// Blocked on the socket.
    AwaitingDatagram,
    /// Decoding and dispatching one datagram.
    Processing,
}

/// What one pass of the receive loop did.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveStep {
    /// The bounded wait elapsed with nothing received.
    Idle,
    /// One datagram was handled.
    Processed(Outcome),
    /// The socket reported an error.
    Failed,
}

/// Inbound half of the bridge.
///
/// Handles one datagram at a time: decode and dispatch finish before the
/// next datagram is read.
pub struct ReceiveLoop<E> {
    receiver: DatagramReceiver,
    codec: EnvelopeCodec,
    dispatcher: Dispatcher<E>,
    sink: Arc<dyn EventSink>,
    idle_delay: Duration,
    state: ReceiveState,
}

impl<E: ScriptExecutor> ReceiveLoop<E> {
    pub fn new(
        receiver: DatagramReceiver,
        codec: EnvelopeCodec,
        dispatcher: Dispatcher<E>,
        sink: Arc<dyn EventSink>,
        idle_delay: Duration,
    ) -> Self {
        Self {
            receiver,
            codec,
            dispatcher,
            sink,
            idle_delay,
            state: ReceiveState::Idle,
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.receiver.local_addr()
    }

    /// Decode one raw datagram and dispatch it.
    ///
    /// Datagrams not addressed to the command topic are never parsed.
    pub fn process(&mut self, raw: &[u8]) -> Outcome {
        match self.codec.decode_command(raw) {
            Ok(Some(command)) => self.dispatcher.dispatch(&command),
            Ok(None) => Outcome::TopicMismatch,
            Err(err) => Outcome::MalformedPayload(err.to_string()),
        }
    }

    /// Wait for at most one datagram and handle it.
    pub fn poll_once(&mut self) -> ReceiveStep {
        self.state = ReceiveState::AwaitingDatagram;
        match self.receiver.recv() {
            Ok(None) => {
                self.state = ReceiveState::Idle;
                ReceiveStep::Idle
            }
            Ok(Some(datagram)) => {
                self.state = ReceiveState::Processing;
                tracing::trace!(source = %datagram.source, size = datagram.len(), "datagram received");
                let outcome = self.process(&datagram.payload);
                self.sink.record(&BridgeEvent::Dispatched {
                    source: Some(datagram.source),
                    outcome: outcome.clone(),
                });
                self.state = ReceiveState::AwaitingDatagram;
                ReceiveStep::Processed(outcome)
            }
            Err(err @ TransportError::DatagramTooLarge { .. }) => {
                let outcome = Outcome::MalformedPayload(err.to_string());
                self.sink.record(&BridgeEvent::Dispatched {
                    source: None,
                    outcome: outcome.clone(),
                });
                ReceiveStep::Processed(outcome)
            }
            Err(err) => {
                self.sink.record(&BridgeEvent::ReceiveFailure {
                    error: err.to_string(),
                });
                self.state = ReceiveState::Idle;
                ReceiveStep::Failed
            }
        }
    }

    /// Poll until `shutdown` is requested.
    ///
    /// An empty wait or a socket error is followed by the idle delay.
    pub fn run(&mut self, shutdown: &ShutdownFlag) {
        tracing::debug!(local_addr = %self.local_addr(), "receive loop started");
        while shutdown.is_running() {
            match self.poll_once() {
                ReceiveStep::Processed(_) => {}
                ReceiveStep::Idle | ReceiveStep::Failed => {
                    shutdown.sleep(self.idle_delay);
                }
            }
        }
        tracing::debug!("receive loop stopped");
    }
}
