mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "pibridge",
    version,
    about = "UDP command/telemetry bridge for a script-running node"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "PIBRIDGE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_text() {
        let cli = Cli::try_parse_from(["pibridge", "send", "127.0.0.1:8888", "--text", "print(1)"])
            .expect("send args should parse");
        assert!(matches!(cli.command, Command::Send(ref args) if args.text.as_deref() == Some("print(1)")));
    }

    #[test]
    fn send_requires_a_script_source() {
        let err = Cli::try_parse_from(["pibridge", "send", "127.0.0.1:8888"])
            .expect_err("missing script source should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn send_rejects_two_script_sources() {
        let err = Cli::try_parse_from([
            "pibridge",
            "send",
            "127.0.0.1:8888",
            "--text",
            "print(1)",
            "--remote",
            "/home/pi/x.py",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_run_with_sensor_override() {
        let cli = Cli::try_parse_from([
            "pibridge",
            "run",
            "--config",
            "/etc/pibridge.toml",
            "--sensor",
            "simulated",
        ])
        .expect("run args should parse");
        assert!(matches!(
            cli.command,
            Command::Run(ref args) if args.sensor == Some(cmd::SensorChoice::Simulated)
        ));
    }

    #[test]
    fn parses_listen_with_count_and_format() {
        let cli = Cli::try_parse_from([
            "pibridge", "listen", "0.0.0.0:8889", "--count", "3", "--format", "pretty",
        ])
        .expect("listen args should parse");
        assert_eq!(cli.format, Some(OutputFormat::Pretty));
        assert!(matches!(cli.command, Command::Listen(ref args) if args.count == Some(3)));
    }

    #[test]
    fn rejects_bad_address() {
        let err = Cli::try_parse_from(["pibridge", "listen", "not-an-address"])
            .expect_err("bad address should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
