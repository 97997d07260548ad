use std::fs;

use pibridge_envelope::{CodecConfig, CommandEnvelope, EnvelopeCodec, TopicTable};
use pibridge_transport::DatagramSender;

use crate::cmd::{SendArgs, TestScript};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, SUCCESS, USAGE};

const PRINT_HELLO_SCRIPT: &str = "print('Hello World')\nprint('Hello Astro Pi')";
const DISPLAY_HELLO_SCRIPT: &str =
    "from sense_hat import SenseHat\nsense = SenseHat()\nsense.show_message('Hello world')\n";

pub fn run(args: SendArgs) -> CliResult<i32> {
    let envelope = resolve_envelope(&args)?;

    let codec = EnvelopeCodec::new(CodecConfig {
        topics: TopicTable {
            command: args.prefix.clone(),
            ..TopicTable::default()
        },
        ..CodecConfig::default()
    });
    let datagram = codec
        .encode_command(&envelope)
        .map_err(|err| frame_error("encode failed", err))?;

    let sender =
        DatagramSender::bind(args.addr).map_err(|err| transport_error("bind failed", err))?;
    let sent = sender
        .send(&datagram)
        .map_err(|err| transport_error("send failed", err))?;

    tracing::info!(
        destination = %args.addr,
        command = envelope.command,
        size = sent,
        "command sent"
    );
    Ok(SUCCESS)
}

fn resolve_envelope(args: &SendArgs) -> CliResult<CommandEnvelope> {
    if let Some(text) = &args.text {
        return Ok(CommandEnvelope::run_text(text.as_str()));
    }
    if let Some(path) = &args.file {
        let text = fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return Ok(CommandEnvelope::run_text(strip_carriage_returns(&text)));
    }
    if let Some(path) = &args.remote {
        return Ok(CommandEnvelope::run_file(path.as_str()));
    }
    if let Some(script) = args.test {
        return Ok(CommandEnvelope::run_text(test_script(script)));
    }
    Err(CliError::new(USAGE, "one of --text, --file, --remote or --test is required"))
}

fn test_script(script: TestScript) -> &'static str {
    match script {
        TestScript::Hello => PRINT_HELLO_SCRIPT,
        TestScript::Display => DISPLAY_HELLO_SCRIPT,
    }
}

fn strip_carriage_returns(text: &str) -> String {
    text.chars().filter(|c| *c != '\r').collect()
}
