// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "gemini-keypool",
    version,
    about = "Key-pool proxy for the Gemini API with per-key circuit breaking",
    long_about = "Fronts the Gemini generateContent API with a pool of API keys. Requests are spread across keys in least-recently-used order, failing keys are quarantined and recovered after a cooldown, and OpenAI-style chat requests are translated to and from the native format."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Server port (overrides the configuration file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the proxy server (default)
    Serve,

    /// Load and validate the configuration, then exit
    CheckConfig,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}
