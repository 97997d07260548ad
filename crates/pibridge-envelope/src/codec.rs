use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::command::CommandEnvelope;
use crate::error::{FrameError, Result};
use crate::telemetry::TelemetryEnvelope;
use crate::topic::{Topic, TopicTable};

/// Socket-buffer artifacts removed before any other processing.
const CONTROL_BYTES: [u8; 2] = [0x00, 0x01];

/// A decoded envelope: the topic it was addressed to and its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The topic whose prefix matched.
    pub topic: Topic,
    /// The JSON document that followed the prefix.
    pub payload: Value,
}

/// Configuration for the envelope codec.
#[derive(Debug, Clone, Default)]
pub struct CodecConfig {
    /// Topic prefixes and match strategy.
    pub topics: TopicTable,
    /// Escape raw line breaks inside JSON strings before parsing.
    pub escape_newlines: bool,
}

/// Encodes and decodes topic-prefixed JSON envelopes.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCodec {
    config: CodecConfig,
}

impl EnvelopeCodec {
    /// Create a codec with explicit configuration.
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Decode a raw datagram addressed to any known topic.
    ///
    /// Returns `Ok(None)` when no known prefix matches. No JSON parse is
    /// attempted in that case.
    pub fn decode(&self, raw: &[u8]) -> Result<Option<Envelope>> {
        let text = clean_text(raw)?;
        match self.config.topics.classify(&text) {
            Some((topic, range)) => self.parse_body(topic, &text, range).map(Some),
            None => Ok(None),
        }
    }

    /// Decode a raw datagram only if it is addressed to `topic`.
    ///
    /// Returns `Ok(None)` for traffic on any other prefix.
    pub fn decode_topic(&self, raw: &[u8], topic: Topic) -> Result<Option<Envelope>> {
        let text = clean_text(raw)?;
        match self.config.topics.locate(topic, &text) {
            Some(range) => self.parse_body(topic, &text, range).map(Some),
            None => {
                trace!(%topic, "datagram not addressed to topic");
                Ok(None)
            }
        }
    }

    /// Decode a command envelope. `Ok(None)` means "not for us".
    pub fn decode_command(&self, raw: &[u8]) -> Result<Option<CommandEnvelope>> {
        self.decode_topic(raw, Topic::Command)?
            .map(|envelope| CommandEnvelope::from_payload(&envelope.payload))
            .transpose()
    }

    /// Decode a telemetry envelope. `Ok(None)` means "not for us".
    pub fn decode_telemetry(&self, raw: &[u8]) -> Result<Option<TelemetryEnvelope>> {
        self.decode_topic(raw, Topic::Telemetry)?
            .map(|envelope| TelemetryEnvelope::from_payload(&envelope.payload))
            .transpose()
    }

    /// Encode `<prefix><JSON>` for a topic.
    ///
    /// No terminator is appended; one envelope fills one datagram.
    pub fn encode<T: Serialize>(&self, topic: Topic, payload: &T) -> Result<Bytes> {
        let body = serde_json::to_vec(payload).map_err(FrameError::Encode)?;
        let prefix = self.config.topics.prefix(topic).as_bytes();

        let mut dst = BytesMut::with_capacity(prefix.len() + body.len());
        dst.put_slice(prefix);
        dst.put_slice(&body);
        Ok(dst.freeze())
    }

    /// Encode a telemetry envelope.
    pub fn encode_telemetry(&self, envelope: &TelemetryEnvelope) -> Result<Bytes> {
        self.encode(Topic::Telemetry, envelope)
    }

    /// Encode a command envelope.
    pub fn encode_command(&self, envelope: &CommandEnvelope) -> Result<Bytes> {
        self.encode(Topic::Command, envelope)
    }

    fn parse_body(
        &self,
        topic: Topic,
        text: &str,
        range: std::ops::Range<usize>,
    ) -> Result<Envelope> {
        // Only the matched occurrence is removed; text before it is kept so a
        // stray leading fragment still fails the JSON parse.
        let mut body = String::with_capacity(text.len() - range.len());
        body.push_str(&text[..range.start]);
        body.push_str(&text[range.end..]);

        let body = if self.config.escape_newlines {
            escape_newlines(&body)
        } else {
            Cow::Borrowed(body.as_str())
        };

        let payload = serde_json::from_str(&body).map_err(FrameError::MalformedJson)?;
        trace!(%topic, size = body.len(), "decoded envelope");
        Ok(Envelope { topic, payload })
    }
}

/// Remove every NUL and SOH byte from a raw payload.
pub fn strip_control_bytes(raw: &[u8]) -> Cow<'_, [u8]> {
    if raw.iter().any(|b| CONTROL_BYTES.contains(b)) {
        Cow::Owned(
            raw.iter()
                .copied()
                .filter(|b| !CONTROL_BYTES.contains(b))
                .collect(),
        )
    } else {
        Cow::Borrowed(raw)
    }
}

/// Escape raw CR, LF and TAB characters that appear inside JSON strings.
///
/// Line breaks between tokens are left alone, so pretty-printed JSON still
/// parses. Already escaped sequences are not touched.
pub fn escape_newlines(json: &str) -> Cow<'_, str> {
    if !json.contains(['\n', '\r', '\t']) {
        return Cow::Borrowed(json);
    }

    let mut out = String::with_capacity(json.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    for ch in json.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(ch);
                continue;
            }
            match ch {
                '\\' => {
                    escaped = true;
                    out.push(ch);
                }
                '"' => {
                    in_string = false;
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(ch),
            }
        } else {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

fn clean_text(raw: &[u8]) -> Result<String> {
    let cleaned = strip_control_bytes(raw).into_owned();
    Ok(String::from_utf8(cleaned)?)
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::json;

    use super::*;
    use crate::command::CommandCode;
    use crate::telemetry::{ParameterFormat, Parameters, Reading};
    use crate::topic::MatchMode;

    const HELLO: &str = r#"basecamp/script:{"command": 1, "script-file": "Undefined", "script-text": "print('Hello world')"}"#;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::default()
    }

    #[test]
    fn decode_command_from_counterpart_datagram() {
        let cmd = codec().decode_command(HELLO.as_bytes()).unwrap().unwrap();
        assert_eq!(cmd.code(), Some(CommandCode::RunText));
        assert_eq!(cmd.script_text.as_deref(), Some("print('Hello world')"));
    }

    #[test]
    fn control_bytes_are_stripped_before_matching() {
        let mut dirty = vec![0x00, 0x01];
        for (i, b) in HELLO.bytes().enumerate() {
            dirty.push(b);
            if i % 7 == 0 {
                dirty.push(0x00);
            }
        }
        dirty.extend_from_slice(&[0x01, 0x00, 0x00]);

        let clean = codec().decode_command(HELLO.as_bytes()).unwrap();
        let noisy = codec().decode_command(&dirty).unwrap();
        assert_eq!(clean, noisy);
    }

    #[test]
    fn other_prefix_is_not_for_us() {
        let raw = br#"other/topic:{"command": 1}"#;
        assert!(codec().decode_command(raw).unwrap().is_none());
    }

    #[test]
    fn mismatched_prefix_skips_json_parse() {
        // Not JSON at all; a parse attempt would fail.
        assert!(codec().decode_command(b"garbage that is not json").unwrap().is_none());
    }

    #[test]
    fn malformed_json_after_prefix() {
        let err = codec()
            .decode_command(b"basecamp/script:{\"command\": ")
            .unwrap_err();
        assert!(matches!(err, FrameError::MalformedJson(_)));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let mut raw = b"basecamp/script:".to_vec();
        raw.extend_from_slice(&[0xFF, 0xFE]);
        let err = codec().decode_command(&raw).unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8(_)));
    }

    #[test]
    fn contains_mode_accepts_leading_text() {
        let codec = EnvelopeCodec::new(CodecConfig {
            topics: TopicTable {
                match_mode: MatchMode::Contains,
                ..TopicTable::default()
            },
            ..CodecConfig::default()
        });
        let raw = format!("   {HELLO}");
        let cmd = codec.decode_command(raw.as_bytes()).unwrap().unwrap();
        assert_eq!(cmd.command, 1);
    }

    #[test]
    fn prefix_literal_inside_script_text_is_preserved() {
        let raw = r#"basecamp/script:{"command": 1, "script-text": "print('basecamp/script:')"}"#;
        let cmd = codec().decode_command(raw.as_bytes()).unwrap().unwrap();
        assert_eq!(cmd.script_text.as_deref(), Some("print('basecamp/script:')"));
    }

    #[test]
    fn raw_newlines_need_escaping() {
        let raw = "basecamp/script:{\"command\": 1,\n \"script-text\": \"import os\nprint(1)\"}";
        assert!(codec().decode_command(raw.as_bytes()).is_err());

        let escaping = EnvelopeCodec::new(CodecConfig {
            escape_newlines: true,
            ..CodecConfig::default()
        });
        let cmd = escaping.decode_command(raw.as_bytes()).unwrap().unwrap();
        assert_eq!(cmd.script_text.as_deref(), Some("import os\nprint(1)"));
    }

    #[test]
    fn escape_newlines_leaves_structure_and_escapes_alone() {
        let input = "{\n\"a\": \"x\\\"\ny\"}";
        assert_eq!(escape_newlines(input), "{\n\"a\": \"x\\\"\\ny\"}");
        assert!(matches!(escape_newlines("{\"a\":1}"), Cow::Borrowed(_)));
    }

    #[test]
    fn decode_routes_to_matching_topic() {
        let envelope = codec()
            .decode(br#"basecamp/rpi/demo:{"name": "x"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(envelope.topic, Topic::Telemetry);
        assert_eq!(envelope.payload, json!({ "name": "x" }));
    }

    #[test]
    fn encode_is_prefix_then_json() {
        let bytes = codec()
            .encode_command(&CommandEnvelope::run_text("print(1)"))
            .unwrap();
        assert_eq!(
            bytes.as_ref(),
            br#"basecamp/script:{"command":1,"script-file":"Undefined","script-text":"print(1)"}"#
        );
    }

    #[test]
    fn telemetry_survives_encode_then_decode() {
        let mut readings = IndexMap::new();
        readings.insert("roll".to_string(), Reading::Float(1.0));
        readings.insert("clear".to_string(), Reading::Integer(4));

        for format in [ParameterFormat::Csv, ParameterFormat::Object] {
            let envelope = TelemetryEnvelope {
                name: "astro-pi".to_string(),
                seq_count: 9,
                date_time: "10/18/2026 12:00:00".to_string(),
                parameters: Parameters::from_readings(&readings, format),
            };
            let wire = codec().encode_telemetry(&envelope).unwrap();
            assert!(wire.starts_with(b"basecamp/rpi/demo:"));

            let decoded = codec()
                .decode_topic(&wire, Topic::Telemetry)
                .unwrap()
                .unwrap();
            assert_eq!(decoded.payload, serde_json::to_value(&envelope).unwrap());
            assert_eq!(codec().decode_telemetry(&wire).unwrap().unwrap(), envelope);
        }
    }

    #[test]
    fn strip_control_bytes_borrows_clean_input() {
        assert!(matches!(strip_control_bytes(b"clean"), Cow::Borrowed(_)));
        assert_eq!(strip_control_bytes(b"\x00a\x01b").as_ref(), b"ab");
    }
}
