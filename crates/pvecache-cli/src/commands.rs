use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use pvecache_core::config::PvecacheConfig;

use crate::display;
use crate::logging::{self, LogFormat};
use crate::output::{self, OutputFormat};
use crate::server;

const DEFAULT_CONFIG: &str = "/etc/pvecache/config.toml";

#[derive(Parser)]
#[command(
    name = "pvecache",
    version,
    about = "In-memory inventory cache for Proxmox VE clusters"
)]
struct Cli {
    /// Log format: human or json
    #[arg(long, global = true, value_enum, default_value = "human")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP surface and the periodic sync loop
    Serve {
        /// Path to the TOML config file
        #[arg(long, short = 'c', default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Run one full sync and print the report
    Sync {
        /// Path to the TOML config file
        #[arg(long, short = 'c', default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Output format: table, json
        #[arg(long, short = 'o', default_value = "table")]
        output: String,
    },
    /// Validate a config file and print the effective settings
    CheckConfig {
        /// Path to the TOML config file
        #[arg(long, short = 'c', default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match cli.command {
        Commands::Serve { config } => {
            let config = load(&config)?;
            runtime()?.block_on(server::serve(config))
        }
        Commands::Sync { config, output } => {
            let config = load(&config)?;
            cmd_sync(config, OutputFormat::from_str_arg(&output))
        }
        Commands::CheckConfig { config } => cmd_check_config(&config),
    }
}

fn load(path: &Path) -> Result<PvecacheConfig> {
    PvecacheConfig::from_file(path)
        .with_context(|| format!("Invalid config at {}", path.display()))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")
}

fn cmd_sync(config: PvecacheConfig, format: OutputFormat) -> Result<()> {
    let cache = server::build_cache(&config)?;
    let report = runtime()?
        .block_on(cache.sync())
        .context("Cluster sync failed")?;

    match format {
        OutputFormat::Json => println!("{}", output::to_json(&report)?),
        OutputFormat::Table => println!("{}", display::sync_report(&report)),
    }
    Ok(())
}

fn cmd_check_config(path: &Path) -> Result<()> {
    let config = load(path)?;
    println!("{} {}", "Config OK:".green().bold(), path.display());
    println!("{}", display::config_summary(&config));
    Ok(())
}
