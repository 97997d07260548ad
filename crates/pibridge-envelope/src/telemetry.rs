use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FrameError, Result};

/// One named scalar reading.
///
/// Integer readings (colour channels) stay integers on the wire; everything
/// else is a float.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Integer(i64),
    Float(f64),
}

impl fmt::Display for Reading {
    /// Decimal text. Whole floats keep one fractional digit (`1.0`) so the
    /// counterpart's float parser sees a float.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Reading::Integer(v) => write!(f, "{v}"),
            Reading::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Reading::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for Reading {
    fn from(value: f64) -> Self {
        Reading::Float(value)
    }
}

impl From<i64> for Reading {
    fn from(value: i64) -> Self {
        Reading::Integer(value)
    }
}

/// How sample readings are laid out in the `parameters` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterFormat {
    /// One flat `"name,value,name,value"` string.
    #[default]
    Csv,
    /// A nested JSON object of name → number.
    Object,
}

/// The `parameters` field of a telemetry envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parameters {
    Csv(String),
    Object(IndexMap<String, Reading>),
}

impl Parameters {
    /// Flatten ordered readings into the requested layout.
    pub fn from_readings(readings: &IndexMap<String, Reading>, format: ParameterFormat) -> Self {
        match format {
            ParameterFormat::Csv => {
                let mut text = String::new();
                for (name, value) in readings {
                    if !text.is_empty() {
                        text.push(',');
                    }
                    text.push_str(name);
                    text.push(',');
                    text.push_str(&value.to_string());
                }
                Parameters::Csv(text)
            }
            ParameterFormat::Object => Parameters::Object(readings.clone()),
        }
    }

    /// Name/value pairs as text, whichever layout was used.
    pub fn to_pairs(&self) -> Result<IndexMap<String, String>> {
        match self {
            Parameters::Csv(text) => parse_csv_parameters(text),
            Parameters::Object(map) => Ok(map
                .iter()
                .map(|(name, value)| (name.clone(), value.to_string()))
                .collect()),
        }
    }
}

/// Payload of an envelope on the telemetry topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    pub name: String,
    #[serde(rename = "seq-count")]
    pub seq_count: u64,
    #[serde(rename = "date-time")]
    pub date_time: String,
    pub parameters: Parameters,
}

impl TelemetryEnvelope {
    /// Extract a telemetry envelope from a decoded JSON payload.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        serde_json::from_value(payload.clone())
            .map_err(|err| FrameError::InvalidTelemetry(err.to_string()))
    }
}

/// Split a flat `"name,value,name,value"` string into ordered pairs.
///
/// Whitespace around each field is trimmed. An empty string yields no
/// pairs; an odd field count or an empty name is rejected.
pub fn parse_csv_parameters(text: &str) -> Result<IndexMap<String, String>> {
    let mut pairs = IndexMap::new();
    if text.trim().is_empty() {
        return Ok(pairs);
    }

    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    if fields.len() % 2 != 0 {
        return Err(FrameError::InvalidParameters(format!(
            "expected name,value pairs but found {} fields",
            fields.len()
        )));
    }

    for pair in fields.chunks_exact(2) {
        if pair[0].is_empty() {
            return Err(FrameError::InvalidParameters(
                "parameter name must not be empty".to_string(),
            ));
        }
        pairs.insert(pair[0].to_string(), pair[1].to_string());
    }
    Ok(pairs)
}
