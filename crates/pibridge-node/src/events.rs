//! Observable bridge events and the sinks that consume them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::dispatcher::Outcome;

/// Something either loop did or failed to do.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// One inbound datagram ran through decode and dispatch.
    Dispatched {
        source: Option<SocketAddr>,
        outcome: Outcome,
    },
    /// A telemetry envelope was sent.
    Published { seq_count: u64, size: usize },
    /// Encoding or sending a telemetry envelope failed.
    SendFailure { error: String },
    /// The sensor could not produce a sample.
    SensorFailure { error: String },
    /// The receive socket reported an error.
    ReceiveFailure { error: String },
}

/// Consumer of bridge events.
///
/// Called from both loop threads.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &BridgeEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn record(&self, event: &BridgeEvent) {
        (**self).record(event)
    }
}

impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn record(&self, event: &BridgeEvent) {
        self.0.record(event);
        self.1.record(event);
    }
}

/// Writes one `tracing` line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &BridgeEvent) {
        match event {
            BridgeEvent::Dispatched { source, outcome } => {
                let source = source.map(|addr| addr.to_string()).unwrap_or_default();
                match outcome {
                    Outcome::Executed { code, report } => tracing::info!(
                        source = %source,
                        code = code.code(),
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        stdout = %report.stdout.trim_end(),
                        "command executed"
                    ),
                    Outcome::TopicMismatch => {
                        tracing::debug!(source = %source, "datagram not addressed to command topic")
                    }
                    Outcome::MalformedPayload(reason) => {
                        tracing::warn!(source = %source, reason = %reason, "malformed command payload")
                    }
                    Outcome::UnknownCommand(code) => {
                        tracing::warn!(source = %source, code = *code, "unknown command code")
                    }
                    Outcome::ExecutionError { stage, message } => tracing::warn!(
                        source = %source,
                        stage = %stage,
                        error = %message,
                        "command failed"
                    ),
                }
            }
            BridgeEvent::Published { seq_count, size } => {
                tracing::info!(seq_count = *seq_count, size = *size, "telemetry published")
            }
            BridgeEvent::SendFailure { error } => {
                tracing::warn!(error = %error, "telemetry send failed")
            }
            BridgeEvent::SensorFailure { error } => {
                tracing::warn!(error = %error, "sensor read failed")
            }
            BridgeEvent::ReceiveFailure { error } => {
                tracing::warn!(error = %error, "receive failed")
            }
        }
    }
}

/// Lock-free counters for every event kind.
#[derive(Debug, Default)]
pub struct BridgeStats {
    executed: AtomicU64,
    topic_mismatch: AtomicU64,
    malformed: AtomicU64,
    unknown_command: AtomicU64,
    execution_error: AtomicU64,
    published: AtomicU64,
    send_failure: AtomicU64,
    sensor_failure: AtomicU64,
    receive_failure: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    pub executed: u64,
    pub topic_mismatch: u64,
    pub malformed: u64,
    pub unknown_command: u64,
    pub execution_error: u64,
    pub published: u64,
    pub send_failure: u64,
    pub sensor_failure: u64,
    pub receive_failure: u64,
}

impl StatsSnapshot {
    /// Inbound datagrams seen, whatever their outcome.
    pub fn datagrams(&self) -> u64 {
        self.executed
            + self.topic_mismatch
            + self.malformed
            + self.unknown_command
            + self.execution_error
    }
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            executed: load(&self.executed),
            topic_mismatch: load(&self.topic_mismatch),
            malformed: load(&self.malformed),
            unknown_command: load(&self.unknown_command),
            execution_error: load(&self.execution_error),
            published: load(&self.published),
            send_failure: load(&self.send_failure),
            sensor_failure: load(&self.sensor_failure),
            receive_failure: load(&self.receive_failure),
        }
    }
}

impl EventSink for BridgeStats {
    fn record(&self, event: &BridgeEvent) {
        let counter = match event {
            BridgeEvent::Dispatched { outcome, .. } => match outcome {
                Outcome::Executed { .. } => &self.executed,
                Outcome::TopicMismatch => &self.topic_mismatch,
                Outcome::MalformedPayload(_) => &self.malformed,
                Outcome::UnknownCommand(_) => &self.unknown_command,
                Outcome::ExecutionError { .. } => &self.execution_error,
            },
            BridgeEvent::Published { .. } => &self.published,
            BridgeEvent::SendFailure { .. } => &self.send_failure,
            BridgeEvent::SensorFailure { .. } => &self.sensor_failure,
            BridgeEvent::ReceiveFailure { .. } => &self.receive_failure,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every event for later inspection.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) events: Mutex<Vec<BridgeEvent>>,
    }

    impl RecordingSink {
        pub(crate) fn events(&self) -> Vec<BridgeEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn record(&self, event: &BridgeEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn dispatched(outcome: Outcome) -> BridgeEvent {
        BridgeEvent::Dispatched {
            source: None,
            outcome,
        }
    }

    #[test]
    fn stats_count_each_kind() {
        let stats = BridgeStats::new();
        stats.record(&dispatched(Outcome::TopicMismatch));
        stats.record(&dispatched(Outcome::TopicMismatch));
        stats.record(&dispatched(Outcome::UnknownCommand(3)));
        stats.record(&dispatched(Outcome::MalformedPayload("bad".into())));
        stats.record(&BridgeEvent::Published {
            seq_count: 1,
            size: 10,
        });
        stats.record(&BridgeEvent::SensorFailure {
            error: "gone".into(),
        });

        let snap = stats.snapshot();
        assert_eq!(snap.topic_mismatch, 2);
        assert_eq!(snap.unknown_command, 1);
        assert_eq!(snap.malformed, 1);
        assert_eq!(snap.published, 1);
        assert_eq!(snap.sensor_failure, 1);
        assert_eq!(snap.datagrams(), 4);
    }

    #[test]
    fn tuple_sink_fans_out() {
        let stats = Arc::new(BridgeStats::new());
        let recorder = Arc::new(RecordingSink::default());
        let sink = (Arc::clone(&stats), Arc::clone(&recorder));

        sink.record(&BridgeEvent::ReceiveFailure {
            error: "reset".into(),
        });
        assert_eq!(stats.snapshot().receive_failure, 1);
        assert_eq!(recorder.events().len(), 1);
    }

    #[test]
    fn log_sink_accepts_every_event() {
        let sink = LogSink;
        sink.record(&dispatched(Outcome::TopicMismatch));
        sink.record(&BridgeEvent::SendFailure {
            error: "unreachable".into(),
        });
    }
}
