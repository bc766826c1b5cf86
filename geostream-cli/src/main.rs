//! Geostream CLI - Command-line harness
//!
//! This binary exercises the geostream library against either a simulated
//! random-walk sensor source (`watch`) or a real IP geolocation endpoint
//! (`ip`).

mod commands;
mod error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "geostream", version, about = "Sensor request manager harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch a simulated position and heading stream through filters.
    Watch(commands::watch::WatchArgs),
    /// Resolve an approximate position from the machine's IP address.
    Ip(commands::ip::IpArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Watch(args) => commands::watch::run(args),
        Command::Ip(args) => commands::ip::run(args),
    };

    if let Err(error) = result {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
