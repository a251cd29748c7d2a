//! Command-line interface for cosmos-shuttle
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and command-line overrides
//! - Dispatch to the export, import and utility subcommands

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, Result};
use crate::store::TimeFilter;

pub mod commands;
pub mod completion;

/// Export and import Cosmos DB containers as JSON array files
#[derive(Parser, Debug)]
#[command(
    name = "cosmos-shuttle",
    version,
    about = "Export and import Cosmos DB containers as JSON array files",
    long_about = "Streams documents between a Cosmos DB container (MongoDB API) and a JSON array
file. Exports page through a filtered query; imports upsert documents in bounded
concurrent batches."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only, no progress)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Disable the progress display
    #[arg(long = "no-progress", global = true)]
    pub no_progress: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Where to connect and which container to use
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Connection string, or `emulator` for the local emulator
    #[arg(long = "connection", value_name = "CONNECTION_STRING")]
    pub connection: Option<String>,

    /// Database name
    #[arg(long = "db", value_name = "NAME")]
    pub database: String,

    /// Container name
    #[arg(long, value_name = "NAME")]
    pub container: String,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Partition key path (e.g. /region); looked up from the container when omitted
    #[arg(long = "partition-key", value_name = "PATH")]
    pub partition_key: Option<String>,
}

/// Subcommands for cosmos-shuttle
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export a container to a JSON array file
    Export {
        #[command(flatten)]
        target: TargetArgs,

        /// Only documents modified at or after this epoch second
        #[arg(long, value_name = "EPOCH_SECONDS")]
        after: Option<i64>,

        /// Only documents modified at or before this epoch second
        #[arg(long, value_name = "EPOCH_SECONDS")]
        before: Option<i64>,

        /// Only documents modified within this inclusive range
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        range: Option<Vec<i64>>,

        /// Documents per query page
        #[arg(long = "page-size", value_name = "COUNT", value_parser = clap::value_parser!(u64).range(1..))]
        page_size: Option<u64>,

        /// Directory the export file is created in
        #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Import a JSON array file into a container
    Import {
        #[command(flatten)]
        target: TargetArgs,

        /// JSON array file to import
        #[arg(long, value_name = "FILE")]
        source: Option<PathBuf>,

        /// Concurrent upserts per batch (1-500)
        #[arg(long = "batch-size", value_name = "COUNT", value_parser = clap::value_parser!(u64).range(1..=500))]
        batch_size: Option<u64>,

        /// Lowercase the first letter of every uppercase-leading field name
        #[arg(long = "camel-case")]
        camel_case: bool,
    },

    /// Show version information
    Version,

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show, validate or create the configuration file
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,

        /// Write a configuration file with default values if none exists
        #[arg(long)]
        init: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Configuration with command-line overrides applied
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        // `config --init` is how a missing explicit file gets created
        let creating = matches!(args.command, Commands::Config { init: true, .. });
        let explicit = args.config_file.as_deref().filter(|path| !creating || path.exists());
        let mut config = Config::load(explicit)?;
        Self::apply_args_to_config(&mut config, &args);
        Ok(Self { args, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_logging_args(config, args);
        Self::apply_command_args(config, args);
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };

        if args.quiet || args.no_progress {
            config.transfer.progress = false;
        }
    }

    /// Apply subcommand options to configuration
    fn apply_command_args(config: &mut Config, args: &CliArgs) {
        let target = match &args.command {
            Commands::Export {
                target, page_size, ..
            } => {
                if let Some(page_size) = page_size {
                    config.transfer.page_size = *page_size as usize;
                }
                target
            }
            Commands::Import {
                target,
                batch_size,
                camel_case,
                ..
            } => {
                if let Some(batch_size) = batch_size {
                    config.transfer.batch_size = *batch_size as usize;
                }
                if *camel_case {
                    config.transfer.camel_case = true;
                }
                target
            }
            _ => return,
        };

        if let Some(connection) = &target.connection {
            config.connection.uri = Some(connection.clone());
        }
        if let Some(timeout) = target.timeout {
            config.connection.timeout = timeout;
        }
    }

    /// Run the selected subcommand
    pub async fn run(&self) -> Result<()> {
        match &self.args.command {
            Commands::Export {
                target,
                after,
                before,
                range,
                output_dir,
                ..
            } => {
                // Filters are checked before anything touches the network
                let filter = TimeFilter::from_options(*after, *before, range_bounds(range)?)?;
                let output_dir = output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
                self.config.validate()?;
                commands::export(&self.config, target, filter, &output_dir).await?;
                Ok(())
            }
            Commands::Import { target, source, .. } => {
                self.config.validate()?;
                commands::import(&self.config, target, source.as_deref()).await?;
                Ok(())
            }
            Commands::Version => {
                self.show_version();
                Ok(())
            }
            Commands::Completion { shell } => completion::generate_completion(shell),
            Commands::Config {
                show,
                validate,
                init,
            } => self.handle_config_command(*show, *validate, *init),
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("cosmos-shuttle version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    fn handle_config_command(&self, show: bool, validate: bool, init: bool) -> Result<()> {
        if init {
            self.init_config_file()?;
        }
        if validate {
            self.validate_config_file()?;
        }
        if show || !(validate || init) {
            self.show_config()?;
        }
        Ok(())
    }

    /// Write default settings to the configuration path, keeping any existing file
    fn init_config_file(&self) -> Result<()> {
        let path = self.get_config_path();
        if path.exists() {
            println!("Configuration file already exists: {}", path.display());
            return Ok(());
        }
        Config::default().save(&path)?;
        println!("Created configuration file: {}", path.display());
        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) -> Result<()> {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist, defaults apply");
            return Ok(());
        }

        Config::from_file(&path)?.validate()?;
        println!("Configuration is valid");
        Ok(())
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.get_config_path().display());
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}

/// Turn the two `--range` values into a pair.
fn range_bounds(range: &Option<Vec<i64>>) -> Result<Option<(i64, i64)>> {
    match range.as_deref() {
        None => Ok(None),
        Some([start, end]) => Ok(Some((*start, *end))),
        Some(values) => Err(ConfigError::InvalidValue {
            field: "range".to_string(),
            value: format!("{values:?}"),
        }
        .into()),
    }
}

/// Check the import source before connecting.
pub fn check_source(source: Option<&Path>) -> Result<PathBuf> {
    let source = source.ok_or_else(|| ConfigError::MissingField("--source".to_string()))?;
    let source = crate::utils::fs::expand_home(&source.to_string_lossy());
    if !source.is_file() {
        return Err(ConfigError::FileNotFound(source.display().to_string()).into());
    }
    Ok(source)
}
