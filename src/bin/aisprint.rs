//! `aisprint` binary: parse flags, set up logging, run one command.

use aisprint::{cli::Cli, commands::{self, Command}};
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    let command = Command::from(cli.command);

    let report = commands::execute(&config, &command)?;
    println!("{report}");
    Ok(())
}
