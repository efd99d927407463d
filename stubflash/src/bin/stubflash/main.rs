mod cmd;

use std::num::ParseIntError;

use anyhow::Result;
use clap::Parser;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

#[derive(clap::Parser)]
#[clap(
    name = "stubflash",
    about = "Programs flash by running flash algorithm stubs on the target",
    version
)]
struct Cli {
    /// Enable debug output.
    #[clap(long, short, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// Inspect the built-in targets
    Chip(cmd::chip::Cmd),
    /// Download a file to a simulated core and print the routine calls
    DryRun(cmd::dry_run::Cmd),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    let stderr_subscriber = fmt::layer().with_writer(std::io::stderr).with_filter(
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy(),
    );

    tracing_subscriber::registry()
        .with(stderr_subscriber)
        .init();

    match cli.subcommand {
        Subcommand::Chip(cmd) => cmd.run(),
        Subcommand::DryRun(cmd) => cmd.run(),
    }
}

fn parse_u64(input: &str) -> Result<u64, ParseIntError> {
    parse_int::parse(input)
}
