//! Sensor collaborators feeding the telemetry publisher.

use std::process::{Command, Stdio};
use std::time::Instant;

use indexmap::IndexMap;
use pibridge_envelope::Reading;
use serde_json::Value;

use crate::error::SensorError;
use crate::executor::{collect, drain, PIPE_GRACE};

/// Float readings of a Sense HAT sample, in wire order.
pub const FLOAT_READINGS: [&str; 9] = [
    "roll",
    "pitch",
    "yaw",
    "accel-x",
    "accel-y",
    "accel-z",
    "pressure",
    "temperature",
    "humidity",
];

/// Integer colour-channel readings, after the floats.
pub const COLOUR_READINGS: [&str; 4] = ["red", "green", "blue", "clear"];

/// One snapshot of named scalar readings, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    readings: IndexMap<String, Reading>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reading, replacing any earlier one with the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Reading>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Reading>) {
        self.readings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<Reading> {
        self.readings.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn readings(&self) -> &IndexMap<String, Reading> {
        &self.readings
    }

    /// Build a sample from a JSON object of name → number.
    ///
    /// Integral numbers become integer readings.
    pub fn from_json(value: &Value) -> Result<Self, SensorError> {
        let object = value.as_object().ok_or_else(|| {
            SensorError::InvalidOutput("expected a JSON object of readings".to_string())
        })?;

        let mut sample = Sample::new();
        for (name, value) in object {
            let reading = if let Some(v) = value.as_i64() {
                Reading::Integer(v)
            } else if let Some(v) = value.as_f64() {
                Reading::Float(v)
            } else {
                return Err(SensorError::InvalidOutput(format!(
                    "reading '{name}' is not a number"
                )));
            };
            sample.insert(name.clone(), reading);
        }
        Ok(sample)
    }
}

/// Produces one sample per telemetry tick.
///
/// May block on hardware; the transmit loop waits for it.
pub trait SensorSource: Send {
    fn read_sample(&mut self) -> Result<Sample, SensorError>;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn read_sample(&mut self) -> Result<Sample, SensorError> {
        (**self).read_sample()
    }
}

/// Deterministic stand-in for the Sense HAT.
///
/// Sample `i` (from 1) carries `i`, `2i` … `9i` for the float readings and
/// `i` … `4i` for the colour channels.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSensor {
    tick: u64,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SensorSource for SimulatedSensor {
    fn read_sample(&mut self) -> Result<Sample, SensorError> {
        self.tick += 1;
        let i = self.tick;

        let mut sample = Sample::new();
        for (n, name) in (1..).zip(FLOAT_READINGS) {
            sample.insert(name, (i * n) as f64);
        }
        for (n, name) in (1..).zip(COLOUR_READINGS) {
            sample.insert(name, (i * n) as i64);
        }
        Ok(sample)
    }
}

/// Runs an external adapter program each tick and parses the JSON object
/// it prints on stdout.
#[derive(Debug, Clone)]
pub struct CommandSensor {
    program: String,
    args: Vec<String>,
}

impl CommandSensor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl SensorSource for CommandSensor {
    fn read_sample(&mut self) -> Result<Sample, SensorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SensorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = child
            .wait()
            .map_err(|err| SensorError::Unavailable(err.to_string()))?;
        let deadline = Instant::now() + PIPE_GRACE;
        let stdout = collect(stdout, deadline);
        let stderr = collect(stderr, deadline);

        if !status.success() {
            return Err(SensorError::Failed {
                exit_code: status.code(),
                stderr: stderr.trim_end().to_string(),
            });
        }

        let value: Value = serde_json::from_str(stdout.trim())
            .map_err(|err| SensorError::InvalidOutput(err.to_string()))?;
        let sample = Sample::from_json(&value)?;
        tracing::trace!(program = %self.program, readings = sample.len(), "sensor sample read");
        Ok(sample)
    }
}
