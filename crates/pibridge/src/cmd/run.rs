use std::sync::Arc;

use pibridge_node::{spawn, BridgeConfig, BridgeStats, EventSink, LogSink, SensorKind};

use crate::cmd::listen::install_ctrlc_handler;
use crate::cmd::{RunArgs, SensorChoice};
use crate::exit::{config_error, node_error, CliResult, SUCCESS};
use crate::output::{print_stats, OutputFormat};

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args)?;

    let executor = config.executor();
    let sensor = config
        .sensor()
        .map_err(|err| config_error("sensor setup failed", err))?;

    let stats = Arc::new(BridgeStats::new());
    let sink: Arc<dyn EventSink> = Arc::new((LogSink, Arc::clone(&stats)));

    let handle = spawn(&config, executor, sensor, sink)
        .map_err(|err| node_error("bridge start failed", err))?;
    install_ctrlc_handler(handle.shutdown_flag())?;

    tracing::info!(
        receive = %handle.receive_addr(),
        executor = %config.executor.program,
        sensor = ?config.sensor.kind,
        "bridge running, press Ctrl-C to stop"
    );

    handle
        .join()
        .map_err(|err| node_error("bridge stopped abnormally", err))?;

    if args.stats {
        print_stats(&stats.snapshot(), format);
    }
    Ok(SUCCESS)
}

fn load_config(args: &RunArgs) -> CliResult<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)
            .map_err(|err| config_error(&format!("failed loading {}", path.display()), err))?,
        None => BridgeConfig::default(),
    };

    if let Some(choice) = args.sensor {
        config.sensor.kind = match choice {
            SensorChoice::Simulated => SensorKind::Simulated,
            SensorChoice::Command => SensorKind::Command,
        };
    }

    config
        .validate()
        .map_err(|err| config_error("invalid configuration", err))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::CONFIG_INVALID;

    #[test]
    fn defaults_apply_without_config_file() {
        let config = load_config(&RunArgs {
            config: None,
            sensor: None,
            stats: false,
        })
        .unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn command_sensor_override_needs_program() {
        let err = load_config(&RunArgs {
            config: None,
            sensor: Some(SensorChoice::Command),
            stats: false,
        })
        .unwrap_err();
        assert_eq!(err.code, CONFIG_INVALID);
    }

    #[test]
    fn missing_config_file_is_config_invalid() {
        let err = load_config(&RunArgs {
            config: Some("/nonexistent/pibridge.toml".into()),
            sensor: None,
            stats: false,
        })
        .unwrap_err();
        assert_eq!(err.code, CONFIG_INVALID);
        assert!(err.message.contains("/nonexistent/pibridge.toml"));
    }
}
