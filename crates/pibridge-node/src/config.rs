//! Bridge configuration.
//!
//! Built once at startup, immutable afterwards, and handed by reference to
//! whatever constructs the sockets, codec, dispatcher and publisher.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use pibridge_envelope::{
    CodecConfig, MatchMode, ParameterFormat, TopicTable, DEFAULT_COMMAND_PREFIX,
    DEFAULT_TELEMETRY_PREFIX,
};
use pibridge_transport::{TransportConfig, DEFAULT_MAX_DATAGRAM, MAX_UDP_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::executor::InterpreterExecutor;
use crate::publisher::PublisherConfig;
use crate::sensor::{CommandSensor, SensorSource, SimulatedSensor};

/// Timestamp layout the flight-software side expects in `date-time`.
pub const DEFAULT_DATE_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub network: NetworkConfig,
    pub timing: TimingConfig,
    pub topics: TopicsConfig,
    pub telemetry: TelemetryConfig,
    pub executor: ExecutorConfig,
    pub sensor: SensorConfig,
}

/// Socket addresses and datagram limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Local address the receive socket binds to.
    pub receive_bind: SocketAddr,
    /// Where telemetry datagrams are sent.
    pub send_destination: SocketAddr,
    /// Largest datagram accepted or sent.
    pub max_datagram_size: usize,
    /// Set `SO_REUSEADDR` on the receive socket.
    pub reuse_address: bool,
    /// Bounded wait for one inbound datagram.
    #[serde(with = "duration_text")]
    pub receive_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            receive_bind: (Ipv4Addr::LOCALHOST, 8888).into(),
            send_destination: (Ipv4Addr::LOCALHOST, 8889).into(),
            max_datagram_size: DEFAULT_MAX_DATAGRAM,
            reuse_address: true,
            receive_timeout: Duration::from_secs(1),
        }
    }
}

/// Loop cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Pause after a receive wait elapses with nothing received.
    #[serde(with = "duration_text")]
    pub receive_idle_delay: Duration,
    /// Interval between telemetry ticks.
    #[serde(with = "duration_text")]
    pub transmit_period: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            receive_idle_delay: Duration::from_secs(1),
            transmit_period: Duration::from_secs(2),
        }
    }
}

/// Topic prefixes and decoding options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopicsConfig {
    pub command_prefix: String,
    pub telemetry_prefix: String,
    pub match_mode: MatchMode,
    /// Escape raw line breaks inside JSON strings before parsing.
    pub escape_newlines: bool,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            telemetry_prefix: DEFAULT_TELEMETRY_PREFIX.to_string(),
            match_mode: MatchMode::Prefix,
            escape_newlines: false,
        }
    }
}

/// Outbound telemetry content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Run the transmit loop at all.
    pub enabled: bool,
    /// Value of the envelope's `name` field.
    pub name: String,
    /// strftime layout of the `date-time` field.
    pub date_time_format: String,
    pub parameter_format: ParameterFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "astro-pi".to_string(),
            date_time_format: DEFAULT_DATE_TIME_FORMAT.to_string(),
            parameter_format: ParameterFormat::Csv,
        }
    }
}

/// Interpreter used to run command scripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    pub program: String,
    /// Interpreter arguments. The script text is written to stdin.
    pub args: Vec<String>,
    /// Kill scripts that run longer than this. Absent means no limit.
    #[serde(with = "optional_duration_text", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-".to_string()],
            timeout: None,
            working_dir: None,
        }
    }
}

/// Which sensor strategy feeds the publisher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Deterministic ramp, no hardware needed.
    #[default]
    Simulated,
    /// External adapter program printing one JSON sample per run.
    Command,
}

/// Sensor strategy selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    pub kind: SensorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    pub args: Vec<String>,
}

impl BridgeConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let net = &self.network;
        if net.max_datagram_size == 0 || net.max_datagram_size > MAX_UDP_PAYLOAD {
            return Err(ConfigError::Invalid(format!(
                "network.max_datagram_size must be between 1 and {MAX_UDP_PAYLOAD}, got {}",
                net.max_datagram_size
            )));
        }
        require_nonzero("network.receive_timeout", net.receive_timeout)?;
        require_nonzero("timing.receive_idle_delay", self.timing.receive_idle_delay)?;
        require_nonzero("timing.transmit_period", self.timing.transmit_period)?;
        if let Some(timeout) = self.executor.timeout {
            require_nonzero("executor.timeout", timeout)?;
        }

        let topics = &self.topics;
        if topics.command_prefix.is_empty() || topics.telemetry_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "topic prefixes must not be empty".to_string(),
            ));
        }
        if topics.command_prefix == topics.telemetry_prefix {
            return Err(ConfigError::Invalid(format!(
                "command and telemetry prefixes must differ (both '{}')",
                topics.command_prefix
            )));
        }

        if StrftimeItems::new(&self.telemetry.date_time_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid(format!(
                "telemetry.date_time_format is not a valid strftime layout: '{}'",
                self.telemetry.date_time_format
            )));
        }

        if self.executor.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "executor.program must not be empty".to_string(),
            ));
        }
        if self.sensor.kind == SensorKind::Command
            && self.sensor.program.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "sensor.program is required when sensor.kind = \"command\"".to_string(),
            ));
        }
        Ok(())
    }

    /// Socket settings for both transport ends.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            max_datagram_size: self.network.max_datagram_size,
            receive_timeout: Some(self.network.receive_timeout),
            reuse_address: self.network.reuse_address,
        }
    }

    /// Envelope codec settings.
    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            topics: TopicTable {
                command: self.topics.command_prefix.clone(),
                telemetry: self.topics.telemetry_prefix.clone(),
                match_mode: self.topics.match_mode,
            },
            escape_newlines: self.topics.escape_newlines,
        }
    }

    /// Telemetry envelope settings.
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            name: self.telemetry.name.clone(),
            date_time_format: self.telemetry.date_time_format.clone(),
            parameter_format: self.telemetry.parameter_format,
        }
    }

    /// The script executor described by `[executor]`.
    pub fn executor(&self) -> InterpreterExecutor {
        let mut executor = InterpreterExecutor::new(&self.executor.program)
            .with_args(self.executor.args.iter().cloned());
        if let Some(timeout) = self.executor.timeout {
            executor = executor.with_timeout(timeout);
        }
        if let Some(dir) = &self.executor.working_dir {
            executor = executor.with_working_dir(dir);
        }
        executor
    }

    /// The sensor strategy described by `[sensor]`.
    pub fn sensor(&self) -> Result<Box<dyn SensorSource>, ConfigError> {
        match self.sensor.kind {
            SensorKind::Simulated => Ok(Box::new(SimulatedSensor::new())),
            SensorKind::Command => {
                let program = self.sensor.program.as_deref().ok_or_else(|| {
                    ConfigError::Invalid(
                        "sensor.program is required when sensor.kind = \"command\"".to_string(),
                    )
                })?;
                Ok(Box::new(
                    CommandSensor::new(program).with_args(self.sensor.args.iter().cloned()),
                ))
            }
        }
    }
}

fn require_nonzero(field: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::Invalid(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(())
}

/// Parse `"<n>s"`, `"<n>ms"` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConfigError::InvalidDuration(
            "duration must not be empty".to_string(),
        ));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(
            "duration must be greater than zero".to_string(),
        ));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

mod optional_duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_str(&super::format_duration(*duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => super::parse_duration(&text)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.topics.command_prefix, "basecamp/script:");
        assert_eq!(config.telemetry.date_time_format, DEFAULT_DATE_TIME_FORMAT);
        assert_eq!(config.executor.program, "python3");
        assert_eq!(config.executor.args, vec!["-".to_string()]);
    }

    #[test]
    fn full_document_parses() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [network]
            receive_bind = "0.0.0.0:9001"
            send_destination = "10.0.0.2:9002"
            max_datagram_size = 2048
            reuse_address = false
            receive_timeout = "250ms"

            [timing]
            receive_idle_delay = "2s"
            transmit_period = "5"

            [topics]
            command_prefix = "lab/script:"
            telemetry_prefix = "lab/tlm:"
            match_mode = "contains"
            escape_newlines = true

            [telemetry]
            enabled = false
            name = "bench"
            parameter_format = "object"

            [executor]
            program = "sh"
            args = ["-s"]
            timeout = "30s"

            [sensor]
            kind = "command"
            program = "/usr/local/bin/read-sense-hat"
            args = ["--json"]
            "#,
        )
        .unwrap();

        assert_eq!(config.network.receive_bind, "0.0.0.0:9001".parse().unwrap());
        assert_eq!(config.network.receive_timeout, Duration::from_millis(250));
        assert_eq!(config.timing.transmit_period, Duration::from_secs(5));
        assert_eq!(config.topics.match_mode, MatchMode::Contains);
        assert_eq!(config.telemetry.parameter_format, ParameterFormat::Object);
        assert_eq!(config.executor.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.sensor.kind, SensorKind::Command);

        let codec = config.codec_config();
        assert_eq!(codec.topics.command, "lab/script:");
        assert!(codec.escape_newlines);
        assert_eq!(config.transport_config().max_datagram_size, 2048);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = BridgeConfig::from_toml_str("[network]\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn oversized_datagram_limit_is_rejected() {
        let err = BridgeConfig::from_toml_str("[network]\nmax_datagram_size = 70000\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("max_datagram_size")));
    }

    #[test]
    fn duplicate_prefixes_are_rejected() {
        let err = BridgeConfig::from_toml_str(
            "[topics]\ncommand_prefix = \"x:\"\ntelemetry_prefix = \"x:\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("differ")));
    }

    #[test]
    fn command_sensor_requires_program() {
        let err = BridgeConfig::from_toml_str("[sensor]\nkind = \"command\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("sensor.program")));
    }

    #[test]
    fn bad_date_time_format_is_rejected() {
        let err = BridgeConfig::from_toml_str("[telemetry]\ndate_time_format = \"%Q\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("date_time_format")));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let err = BridgeConfig::from_toml_str("[timing]\ntransmit_period = \"0s\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn config_serializes_back_to_toml() {
        let config = BridgeConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("receive_timeout = \"1s\""));
        assert_eq!(BridgeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn sensor_strategy_follows_kind() {
        let config = BridgeConfig::default();
        let mut sensor = config.sensor().unwrap();
        let sample = sensor.read_sample().unwrap();
        assert!(sample.get("roll").is_some());
    }
}
