use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgGroup, Args, Subcommand, ValueEnum};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod listen;
pub mod run;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge until interrupted.
    Run(RunArgs),
    /// Send one command envelope.
    Send(SendArgs),
    /// Listen for telemetry envelopes and print them.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Sensor strategy override for `run`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SensorChoice {
    Simulated,
    Command,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, short = 'c', value_name = "FILE", env = "PIBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Override the configured sensor strategy.
    #[arg(long, value_name = "KIND")]
    pub sensor: Option<SensorChoice>,
    /// Print event counters on exit.
    #[arg(long)]
    pub stats: bool,
}

/// Built-in scripts for exercising a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TestScript {
    /// Print two greeting lines.
    Hello,
    /// Scroll a greeting across the Sense HAT display.
    Display,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("script").required(true).args(["text", "file", "remote", "test"])))]
pub struct SendArgs {
    /// Node address to send to (host:port).
    pub addr: SocketAddr,
    /// Inline script text.
    #[arg(long)]
    pub text: Option<String>,
    /// Local script file, sent inline.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    /// Script path on the node, read there.
    #[arg(long, value_name = "PATH")]
    pub remote: Option<String>,
    /// Send a built-in test script.
    #[arg(long, value_name = "SCRIPT")]
    pub test: Option<TestScript>,
    /// Command topic prefix.
    #[arg(long, default_value = pibridge_envelope::DEFAULT_COMMAND_PREFIX)]
    pub prefix: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Local address to bind (host:port).
    pub bind: SocketAddr,
    /// Exit after printing N telemetry envelopes.
    #[arg(long)]
    pub count: Option<usize>,
    /// Telemetry topic prefix.
    #[arg(long, default_value = pibridge_envelope::DEFAULT_TELEMETRY_PREFIX)]
    pub prefix: String,
    /// Largest datagram accepted.
    #[arg(long, default_value_t = pibridge_transport::DEFAULT_MAX_DATAGRAM)]
    pub max_datagram_size: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
