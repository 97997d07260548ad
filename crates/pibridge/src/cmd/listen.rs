use std::time::Duration;

use pibridge_envelope::{CodecConfig, EnvelopeCodec, TopicTable};
use pibridge_node::ShutdownFlag;
use pibridge_transport::{DatagramReceiver, TransportConfig, TransportError};

use crate::cmd::ListenArgs;
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_telemetry, OutputFormat};

/// Wait per receive call, so Ctrl-C is noticed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = TransportConfig {
        max_datagram_size: args.max_datagram_size,
        receive_timeout: Some(POLL_INTERVAL),
        ..TransportConfig::default()
    };
    let mut receiver = DatagramReceiver::bind_with_config(args.bind, config)
        .map_err(|err| transport_error("bind failed", err))?;

    let codec = EnvelopeCodec::new(CodecConfig {
        topics: TopicTable {
            telemetry: args.prefix.clone(),
            ..TopicTable::default()
        },
        ..CodecConfig::default()
    });

    let shutdown = ShutdownFlag::new();
    install_ctrlc_handler(shutdown.clone())?;

    let mut printed = 0usize;
    while shutdown.is_running() {
        let datagram = match receiver.recv() {
            Ok(Some(datagram)) => datagram,
            Ok(None) => continue,
            Err(err @ TransportError::DatagramTooLarge { .. }) => {
                tracing::warn!(error = %err, "datagram dropped");
                continue;
            }
            Err(err) => return Err(transport_error("receive failed", err)),
        };

        let envelope = match codec.decode_telemetry(&datagram.payload) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                tracing::debug!(source = %datagram.source, "datagram not addressed to telemetry topic");
                continue;
            }
            Err(err) => {
                tracing::warn!(source = %datagram.source, error = %err, "malformed telemetry envelope");
                continue;
            }
        };

        print_telemetry(&envelope, datagram.source, &datagram.payload, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

pub(crate) fn install_ctrlc_handler(shutdown: ShutdownFlag) -> CliResult<()> {
    ctrlc::set_handler(move || shutdown.request_stop())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
