use std::sync::Arc;
use std::time::Duration;

use crate::error::NodeError;
use crate::events::{BridgeEvent, EventSink};
use crate::publisher::Publisher;
use crate::sensor::SensorSource;
use crate::shutdown::ShutdownFlag;

/// Where the transmit loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitState {
    /// Waiting for the next period.
    Idle,
    /// Reading the sensor and sending.
    Publishing,
}

/// Outbound half of the bridge: one telemetry tick per period.
pub struct TransmitLoop<S> {
    publisher: Publisher<S>,
    sink: Arc<dyn EventSink>,
    period: Duration,
    state: TransmitState,
}

impl<S: SensorSource> TransmitLoop<S> {
    pub fn new(publisher: Publisher<S>, sink: Arc<dyn EventSink>, period: Duration) -> Self {
        Self {
            publisher,
            sink,
            period,
            state: TransmitState::Idle,
        }
    }

    pub fn state(&self) -> TransmitState {
        self.state
    }

    pub fn publisher(&self) -> &Publisher<S> {
        &self.publisher
    }

    /// Publish one sample and record what happened.
    ///
    /// Returns `true` if a datagram was sent.
    pub fn tick_once(&mut self) -> bool {
        self.state = TransmitState::Publishing;
        let event = match self.publisher.tick() {
            Ok(size) => BridgeEvent::Published {
                seq_count: self.publisher.seq_count(),
                size,
            },
            Err(NodeError::Sensor(err)) => BridgeEvent::SensorFailure {
                error: err.to_string(),
            },
            Err(err) => BridgeEvent::SendFailure {
                error: err.to_string(),
            },
        };
        self.state = TransmitState::Idle;

        let sent = matches!(event, BridgeEvent::Published { .. });
        self.sink.record(&event);
        sent
    }

    /// Sleep one period, then tick, until `shutdown` is requested.
    pub fn run(&mut self, shutdown: &ShutdownFlag) {
        tracing::debug!(
            destination = %self.publisher.sender().destination(),
            period_ms = self.period.as_millis() as u64,
            "transmit loop started"
        );
        while shutdown.sleep(self.period) {
            self.tick_once();
        }
        tracing::debug!(seq_count = self.publisher.seq_count(), "transmit loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use pibridge_envelope::{CodecConfig, EnvelopeCodec};
    use pibridge_transport::{DatagramReceiver, DatagramSender, TransportConfig};

    use super::*;
    use crate::error::SensorError;
    use crate::events::tests::RecordingSink;
    use crate::publisher::tests::{orientation, ScriptedSensor};
    use crate::publisher::PublisherConfig;
    use crate::sensor::Sample;

    fn transmit_loop(
        sensor: ScriptedSensor,
        sink: Arc<RecordingSink>,
    ) -> (DatagramReceiver, TransmitLoop<ScriptedSensor>) {
        let config = TransportConfig {
            receive_timeout: Some(Duration::from_secs(2)),
            ..TransportConfig::default()
        };
        let receiver =
            DatagramReceiver::bind_with_config("127.0.0.1:0".parse().unwrap(), config.clone())
                .unwrap();
        let sender = DatagramSender::bind_with_config(receiver.local_addr(), &config).unwrap();
        let publisher = Publisher::new(
            EnvelopeCodec::new(CodecConfig::default()),
            sender,
            sensor,
            PublisherConfig::default(),
        );
        let tx = TransmitLoop::new(publisher, sink, Duration::from_millis(20));
        (receiver, tx)
    }

    #[test]
    fn tick_records_published_event() {
        let sink = Arc::new(RecordingSink::default());
        let (mut receiver, mut tx) = transmit_loop(ScriptedSensor::default(), sink.clone());

        assert!(tx.tick_once());
        assert!(receiver.recv().unwrap().is_some());
        assert!(matches!(
            sink.events().as_slice(),
            [BridgeEvent::Published { seq_count: 1, .. }]
        ));
        assert_eq!(tx.state(), TransmitState::Idle);
    }

    #[test]
    fn sensor_failure_is_recorded_and_loop_continues() {
        let sensor = ScriptedSensor {
            queue: VecDeque::from([Err(SensorError::Unavailable("i2c".into()))]),
        };
        let sink = Arc::new(RecordingSink::default());
        let (_receiver, mut tx) = transmit_loop(sensor, sink.clone());

        assert!(!tx.tick_once());
        assert!(tx.tick_once());
        let events = sink.events();
        assert!(matches!(events[0], BridgeEvent::SensorFailure { .. }));
        assert!(matches!(events[1], BridgeEvent::Published { seq_count: 1, .. }));
    }

    #[test]
    fn send_failure_is_recorded_and_sequence_holds() {
        let oversized = Sample::new().with("x".repeat(8 * 1024), 1.0);
        let sensor = ScriptedSensor {
            queue: VecDeque::from([Ok(oversized), Ok(orientation())]),
        };
        let sink = Arc::new(RecordingSink::default());
        let (mut receiver, mut tx) = transmit_loop(sensor, sink.clone());

        assert!(!tx.tick_once());
        assert_eq!(tx.publisher().seq_count(), 0);
        assert_eq!(tx.state(), TransmitState::Idle);

        assert!(tx.tick_once());
        let datagram = receiver.recv().unwrap().expect("telemetry datagram");
        let envelope = EnvelopeCodec::new(CodecConfig::default())
            .decode_telemetry(&datagram.payload)
            .unwrap()
            .unwrap();
        assert_eq!(envelope.seq_count, 1);

        let events = sink.events();
        assert!(matches!(&events[0], BridgeEvent::SendFailure { error } if error.contains("payload too large")));
        assert!(matches!(events[1], BridgeEvent::Published { seq_count: 1, .. }));
    }

    #[test]
    fn run_publishes_until_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let (mut receiver, mut tx) = transmit_loop(ScriptedSensor::default(), sink.clone());
        let flag = ShutdownFlag::new();
        let stopper = flag.clone();

        let handle = std::thread::spawn(move || {
            tx.run(&flag);
            tx
        });
        assert!(receiver.recv().unwrap().is_some());
        assert!(receiver.recv().unwrap().is_some());
        stopper.request_stop();
        let tx = handle.join().unwrap();
        assert!(tx.publisher().seq_count() >= 2);
    }
}
