//! Powerman CLI: find a USB power board by serial and play tunes on its buzzer.

use std::path::PathBuf;

use clap::Parser;

mod cli;

#[derive(Parser)]
#[command(
    name = "powerman",
    version,
    about = "Find a USB power board by serial and drive its control protocol"
)]
struct Args {
    /// Output as JSON (for run, devices, config)
    #[arg(long, global = true)]
    json: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let ctx = cli::Context {
        json: args.json,
        config_path: args.config,
    };

    if let Err(e) = cli::run(args.command, &ctx) {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
