//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Values given here override `.rbridge.toml`.

use clap::Parser;
use std::path::PathBuf;

/// rbridge - R analysis backend supervisor and upload proxy
///
/// Starts the R Plumber API as a child process, forwards dataset uploads
/// to it, and layers optional Gemini insights on top of its summaries.
///
/// Examples:
///   rbridge
///   rbridge --port 5050 --backend-port 8050
///   rbridge --no-backend --backend-port 8000
///   GOOGLE_API_KEY=... rbridge --verbose
///   rbridge --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Port for the orchestration layer (default: 5000)
    #[arg(short, long, value_name = "PORT", env = "RBRIDGE_PORT")]
    pub port: Option<u16>,

    /// Port the R backend listens on (default: 8000)
    #[arg(long, value_name = "PORT", env = "RBRIDGE_BACKEND_PORT")]
    pub backend_port: Option<u16>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .rbridge.toml in the working directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Working directory holding api.R and R_libs
    ///
    /// Defaults to the current directory
    #[arg(short, long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Do not launch the R backend; proxy to an already running one
    #[arg(long)]
    pub no_backend: bool,

    /// Gemini API key (enables AI insights and /ask-ai)
    #[arg(long, value_name = "KEY", env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .rbridge.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.port == Some(0) || self.backend_port == Some(0) {
            return Err("Ports must be between 1 and 65535".to_string());
        }

        if let (Some(port), Some(backend_port)) = (self.port, self.backend_port) {
            if port == backend_port {
                return Err(format!(
                    "--port and --backend-port must differ (both are {})",
                    port
                ));
            }
        }

        if let Some(ref workdir) = self.workdir {
            if !workdir.exists() {
                return Err(format!(
                    "Working directory does not exist: {}",
                    workdir.display()
                ));
            }
            if !workdir.is_dir() {
                return Err(format!(
                    "Working directory is not a directory: {}",
                    workdir.display()
                ));
            }
        }

        if let Some(ref config) = self.config {
            if !config.is_file() {
                return Err(format!("Config file not found: {}", config.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
