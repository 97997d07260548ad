//! Known topics and how their prefixes are matched.
//!
//! Only two topics exist. Anything else on the wire is traffic for some
//! other consumer and is filtered, not rejected.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Default prefix for inbound script-execution commands.
pub const DEFAULT_COMMAND_PREFIX: &str = "basecamp/script:";

/// Default prefix for outbound sensor telemetry.
pub const DEFAULT_TELEMETRY_PREFIX: &str = "basecamp/rpi/demo:";

/// The logical channel an envelope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Inbound script-execution requests.
    Command,
    /// Outbound periodic sensor messages.
    Telemetry,
}

impl Topic {
    /// Human-readable topic name.
    pub fn name(self) -> &'static str {
        match self {
            Topic::Command => "COMMAND",
            Topic::Telemetry => "TELEMETRY",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a topic prefix is located in the cleaned datagram text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// The text must start with the prefix.
    #[default]
    Prefix,
    /// The prefix may appear anywhere in the text.
    Contains,
}

/// Prefix strings for the known topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicTable {
    /// Prefix of inbound command envelopes.
    pub command: String,
    /// Prefix of outbound telemetry envelopes.
    pub telemetry: String,
    /// Prefix matching strategy.
    #[serde(default)]
    pub match_mode: MatchMode,
}

impl Default for TopicTable {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND_PREFIX.to_string(),
            telemetry: DEFAULT_TELEMETRY_PREFIX.to_string(),
            match_mode: MatchMode::Prefix,
        }
    }
}

impl TopicTable {
    /// Prefix string for a topic.
    pub fn prefix(&self, topic: Topic) -> &str {
        match topic {
            Topic::Command => &self.command,
            Topic::Telemetry => &self.telemetry,
        }
    }

    /// Locate `topic`'s prefix in `text`, returning the byte range it occupies.
    pub fn locate(&self, topic: Topic, text: &str) -> Option<Range<usize>> {
        let prefix = self.prefix(topic);
        if prefix.is_empty() {
            return None;
        }
        match self.match_mode {
            MatchMode::Prefix => text.starts_with(prefix).then(|| 0..prefix.len()),
            MatchMode::Contains => text.find(prefix).map(|at| at..at + prefix.len()),
        }
    }

    /// Find whichever known topic `text` is addressed to.
    ///
    /// In `contains` mode the earliest occurrence wins; ties go to the
    /// command topic.
    pub fn classify(&self, text: &str) -> Option<(Topic, Range<usize>)> {
        [Topic::Command, Topic::Telemetry]
            .into_iter()
            .filter_map(|topic| self.locate(topic, text).map(|range| (topic, range)))
            .min_by_key(|(_, range)| range.start)
    }
}
