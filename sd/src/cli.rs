//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sd - maternal SOS dispatch
#[derive(Parser, Debug)]
#[command(
    name = "sd",
    version,
    about = "Nearest-midwife matching and SOS dispatch",
    after_help = "Set RUST_LOG to override the log filter; logs go to stderr."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered providers
    #[command(allow_negative_numbers = true)]
    Providers {
        /// Show the distance from this point
        #[arg(long, num_args = 2, value_names = ["LAT", "LON"])]
        near: Option<Vec<f64>>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Find the nearest available provider
    #[command(allow_negative_numbers = true)]
    Nearest {
        /// Requester latitude in decimal degrees
        latitude: f64,

        /// Requester longitude in decimal degrees
        longitude: f64,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run one emergency end to end against a simulated provider
    #[command(allow_negative_numbers = true)]
    Simulate {
        /// Requester latitude in decimal degrees
        latitude: f64,

        /// Requester longitude in decimal degrees
        longitude: f64,

        /// Simulated provider rejects
        #[arg(long, conflicts_with = "silent")]
        reject: bool,

        /// Simulated provider never answers
        #[arg(long)]
        silent: bool,

        /// Seconds before the simulated provider answers
        #[arg(short, long)]
        delay: Option<u64>,

        /// Provider response window in seconds
        #[arg(short, long)]
        window: Option<u64>,
    },
}

/// Output format for listing commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
