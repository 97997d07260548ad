//! The bridge node: everything between the sockets and the collaborators.
//!
//! Inbound, the [`ReceiveLoop`] waits for a datagram, the codec decodes it
//! and the [`Dispatcher`] hands the script to a [`ScriptExecutor`].
//! Outbound, the [`TransmitLoop`] wakes once per period and the
//! [`Publisher`] turns a [`Sample`] from a [`SensorSource`] into a
//! telemetry datagram. Every outcome lands in an [`EventSink`]; nothing
//! escapes a loop.

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod executor;
pub mod publisher;
pub mod receive;
pub mod sensor;
pub mod shutdown;
pub mod transmit;

pub use bridge::{spawn, BridgeHandle};
pub use config::{
    parse_duration, BridgeConfig, ExecutorConfig, NetworkConfig, SensorConfig, SensorKind,
    TelemetryConfig, TimingConfig, TopicsConfig,
};
pub use dispatcher::{Dispatcher, ExecutionStage, Outcome};
pub use error::{ConfigError, ExecError, NodeError, Result, SensorError};
pub use events::{BridgeEvent, BridgeStats, EventSink, LogSink, StatsSnapshot};
pub use executor::{ExecutionReport, InterpreterExecutor, ScriptExecutor};
pub use publisher::{Publisher, PublisherConfig};
pub use receive::{ReceiveLoop, ReceiveState, ReceiveStep};
pub use sensor::{CommandSensor, Sample, SensorSource, SimulatedSensor};
pub use shutdown::ShutdownFlag;
pub use transmit::{TransmitLoop, TransmitState};
