//! CLI parse: clap types for chartgate. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chartgate CLI - turn text into charts through a vetted, sandboxed plotting script
#[derive(Parser)]
#[command(name = "chartgate")]
#[command(about = "Generate charts from text with safety-gated, sandboxed plotting scripts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a chart from text
    Generate {
        /// Input text describing data, a function, or a distribution
        text: String,
        /// Chart type hint (line, scatter, bar, histogram, pie, box, heatmap, 3d)
        #[arg(long = "type")]
        chart_type: Option<String>,
        /// Print stage events as they happen
        #[arg(long)]
        stream: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Judge whether text can be charted
    Classify {
        text: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Run the safety check on a script file
    Validate {
        file: PathBuf,
    },
    /// Report plotting library readiness
    Deps {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List chart types the pipeline can name
    Types,
    /// Manage rendered chart files
    Artifacts {
        #[command(subcommand)]
        command: ArtifactsCommands,
    },
    /// Manage the result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ArtifactsCommands {
    /// List rendered charts, newest first
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Remove charts past the age or count limits
    Cleanup {
        /// Maximum age in seconds (default from config)
        #[arg(long)]
        max_age_secs: Option<u64>,
        /// Maximum number of charts kept (default from config)
        #[arg(long)]
        max_files: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Remove every cached result
    Clear {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Output format (toml or json)
        #[arg(long, default_value = "toml")]
        format: String,
    },
}
