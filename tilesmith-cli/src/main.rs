//! Tilesmith command-line interface.

use clap::{Parser, Subcommand};

mod commands;
mod error;

use commands::{build, config, regions};

#[derive(Debug, Parser)]
#[command(
    name = "tilesmith",
    version,
    about = "Build distributable map-tile archives from OpenStreetMap extracts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the build pipeline
    Build(build::BuildArgs),

    /// List the regions a build would process
    Regions(regions::RegionsArgs),

    /// Inspect or initialize the configuration file
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build(args) => build::run(args),
        Commands::Regions(args) => regions::run(args),
        Commands::Config { command } => config::run(command),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
