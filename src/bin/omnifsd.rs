//! CLI entry point: loads configuration, formats the container if absent
//! or `--format` is passed, then runs the server (SPEC_FULL.md §4.12).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;
use omnifs::config::Config;
use omnifs::engine::Engine;
use omnifs::{container, server};

#[derive(Parser, Debug)]
#[command(name = "omnifsd", about = "OmniFS control server")]
struct Args {
    /// Path to the backing container file.
    #[arg(long, default_value = "filesystem.omni")]
    container: PathBuf,

    /// Path to the `key = value` configuration file.
    #[arg(long, default_value = "omnifs.conf")]
    config: PathBuf,

    /// Overrides the config file's `port` value.
    #[arg(long)]
    port: Option<u16>,

    /// Reformats the container even if it already exists.
    #[arg(long)]
    format: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load config {:?}: {e}", args.config);
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    if args.format && args.container.exists() {
        if let Err(e) = container::format(&args.container, &config) {
            error!("failed to format container {:?}: {e}", args.container);
            return ExitCode::FAILURE;
        }
    }

    let engine = match Engine::open_or_format(&args.container, config.clone()) {
        Ok(e) => e,
        Err(e) => {
            error!("failed to initialize container {:?}: {e}", args.container);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server::run(engine, config.port).await {
        error!("server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
