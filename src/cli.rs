// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `gantry`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "gantry",
    version,
    about = "Build, test and deploy interdependent modules in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the project file (TOML).
    ///
    /// Default: `gantry.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value = "gantry.toml")]
    pub config: String,

    /// Maximum number of tasks executing concurrently.
    #[arg(long, global = true, value_name = "N", default_value_t = 8)]
    pub jobs: usize,

    /// Re-run requested tasks even when their versions are unchanged.
    #[arg(long, global = true)]
    pub force: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `GANTRY_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build the selected modules and everything they depend on.
    Build {
        /// Modules to build (default: all).
        modules: Vec<String>,
    },
    /// Run the tests of the selected modules.
    Test {
        /// Modules to test (default: all).
        modules: Vec<String>,
    },
    /// Deploy the selected service modules.
    Deploy {
        /// Modules to deploy (default: all services).
        modules: Vec<String>,
    },
    /// Build and deploy continuously, re-running affected work on change.
    Dev {
        /// Modules to watch (default: all).
        modules: Vec<String>,
    },
}

impl Command {
    pub fn modules(&self) -> &[String] {
        match self {
            Command::Build { modules }
            | Command::Test { modules }
            | Command::Deploy { modules }
            | Command::Dev { modules } => modules,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
