use std::fmt::Write as _;

use chrono::Local;
use pibridge_envelope::{EnvelopeCodec, ParameterFormat, Parameters, TelemetryEnvelope};
use pibridge_transport::DatagramSender;

use crate::config::DEFAULT_DATE_TIME_FORMAT;
use crate::error::{ConfigError, Result};
use crate::sensor::{Sample, SensorSource};

/// Fixed content of every telemetry envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    pub name: String,
    pub date_time_format: String,
    pub parameter_format: ParameterFormat,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            name: "astro-pi".to_string(),
            date_time_format: DEFAULT_DATE_TIME_FORMAT.to_string(),
            parameter_format: ParameterFormat::Csv,
        }
    }
}

/// Turns sensor samples into telemetry datagrams.
///
/// `seq-count` starts at 1 and only advances when a datagram actually
/// leaves the socket, so a failed tick is retried with the same number.
pub struct Publisher<S> {
    codec: EnvelopeCodec,
    sender: DatagramSender,
    sensor: S,
    config: PublisherConfig,
    next_seq: u64,
}

impl<S: SensorSource> Publisher<S> {
    pub fn new(
        codec: EnvelopeCodec,
        sender: DatagramSender,
        sensor: S,
        config: PublisherConfig,
    ) -> Self {
        Self {
            codec,
            sender,
            sensor,
            config,
            next_seq: 1,
        }
    }

    /// Sequence number of the last envelope sent, 0 before the first.
    pub fn seq_count(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn sender(&self) -> &DatagramSender {
        &self.sender
    }

    /// Read one sample, send it, and return the envelope size in bytes.
    pub fn tick(&mut self) -> Result<usize> {
        let sample = self.sensor.read_sample()?;
        let envelope = self.build_envelope(&sample)?;
        let datagram = self.codec.encode_telemetry(&envelope)?;
        let sent = self.sender.send(&datagram)?;

        self.next_seq += 1;
        tracing::trace!(
            seq_count = envelope.seq_count,
            destination = %self.sender.destination(),
            size = sent,
            "telemetry datagram sent"
        );
        Ok(sent)
    }

    /// The envelope the next tick would send for `sample`.
    pub fn build_envelope(&self, sample: &Sample) -> Result<TelemetryEnvelope> {
        Ok(TelemetryEnvelope {
            name: self.config.name.clone(),
            seq_count: self.next_seq,
            date_time: self.timestamp()?,
            parameters: Parameters::from_readings(
                sample.readings(),
                self.config.parameter_format,
            ),
        })
    }

    fn timestamp(&self) -> Result<String> {
        let mut text = String::new();
        write!(text, "{}", Local::now().format(&self.config.date_time_format)).map_err(|_| {
            ConfigError::Invalid(format!(
                "cannot format timestamp with '{}'",
                self.config.date_time_format
            ))
        })?;
        Ok(text)
    }
}
