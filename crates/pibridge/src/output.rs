use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pibridge_envelope::TelemetryEnvelope;
use pibridge_node::StatsSnapshot;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct TelemetryOutput<'a> {
    source: String,
    name: &'a str,
    seq_count: u64,
    date_time: &'a str,
    parameter_count: usize,
    parameters: Vec<(String, String)>,
    received_at: String,
}

/// Print one decoded telemetry envelope.
///
/// `raw` is the datagram exactly as received, used by the raw format.
pub fn print_telemetry(
    envelope: &TelemetryEnvelope,
    source: SocketAddr,
    raw: &[u8],
    format: OutputFormat,
) {
    let pairs: Vec<(String, String)> = match envelope.parameters.to_pairs() {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(err) => {
            tracing::warn!(seq_count = envelope.seq_count, error = %err, "unparseable telemetry parameters");
            Vec::new()
        }
    };

    match format {
        OutputFormat::Json => {
            let out = TelemetryOutput {
                source: source.to_string(),
                name: &envelope.name,
                seq_count: envelope.seq_count,
                date_time: &envelope.date_time,
                parameter_count: pairs.len(),
                parameters: pairs,
                received_at: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "NAME", "DATE-TIME", "PARAMETER", "VALUE"]);
            for (index, (name, value)) in pairs.iter().enumerate() {
                let (seq, label, stamp) = if index == 0 {
                    (
                        envelope.seq_count.to_string(),
                        envelope.name.clone(),
                        envelope.date_time.clone(),
                    )
                } else {
                    (String::new(), String::new(), String::new())
                };
                table.add_row(vec![seq, label, stamp, name.clone(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let params = pairs
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "seq={} name={} date-time={} from={} params({})={}",
                envelope.seq_count,
                envelope.name,
                envelope.date_time,
                source,
                pairs.len(),
                params
            );
        }
        OutputFormat::Raw => print_raw(raw),
    }
}

/// Print the bridge counters collected during a run.
pub fn print_stats(stats: &StatsSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(stats).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "COUNT"]);
            for (label, count) in stat_rows(stats) {
                table.add_row(vec![label.to_string(), count.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = stat_rows(stats)
                .iter()
                .map(|(label, count)| format!("{label}={count}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
    }
}

fn stat_rows(stats: &StatsSnapshot) -> [(&'static str, u64); 9] {
    [
        ("executed", stats.executed),
        ("topic-mismatch", stats.topic_mismatch),
        ("malformed", stats.malformed),
        ("unknown-command", stats.unknown_command),
        ("execution-error", stats.execution_error),
        ("published", stats.published),
        ("send-failure", stats.send_failure),
        ("sensor-failure", stats.sensor_failure),
        ("receive-failure", stats.receive_failure),
    ]
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
