//! The `config` subcommand: inspect and initialize configuration.

use clap::Subcommand;

use tilesmith::config::{config_file_path, format_size, ConfigFile};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Write a config file with default settings
    Init,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_show(),
        ConfigCommands::Path => run_path(),
        ConfigCommands::Init => run_init(),
    }
}

fn run_show() -> Result<(), CliError> {
    let config = ConfigFile::load().unwrap_or_default();
    print_config(&config);
    Ok(())
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

fn run_init() -> Result<(), CliError> {
    let path = config_file_path();
    if path.exists() {
        return Err(CliError::Config(format!(
            "config file already exists at {}",
            path.display()
        )));
    }

    ConfigFile::default().save()?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn print_config(config: &ConfigFile) {
    println!("[build]");
    println!("output_dir     = {}", config.output_dir.display());
    println!("data_dir       = {}", config.data_dir.display());
    println!(
        "min_free_bytes = {} ({})",
        config.min_free_bytes,
        format_size(config.min_free_bytes)
    );
    println!();
    println!("[zoom]");
    println!("min = {}", config.min_zoom);
    println!("max = {}", config.max_zoom);
    println!();
    println!("[fetch]");
    println!("attempts         = {}", config.fetch_attempts);
    println!("verify_checksums = {}", config.verify_checksums);
    println!();
    println!("[datasets]");
    println!("auto_fetch = {}", config.auto_fetch_datasets);
    println!();
    println!("[bridge]");
    println!("mode   = {}", config.exec_mode);
    println!("target = {}", config.bridge_target);
    println!();
    println!("[tools]");
    println!("renderer  = {}", config.renderer_cmd);
    println!("converter = {}", config.converter_cmd);
    println!();
    println!("[publish]");
    println!("url_prefix = {}", config.publish_url_prefix);
}
