use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("pibridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: pibridge");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("PIBRIDGE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "command_prefix: {}",
        pibridge_envelope::DEFAULT_COMMAND_PREFIX
    );
    println!(
        "telemetry_prefix: {}",
        pibridge_envelope::DEFAULT_TELEMETRY_PREFIX
    );
    println!("features: node={}, cli=true", cfg!(feature = "node"));

    Ok(SUCCESS)
}
