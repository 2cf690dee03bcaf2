//! CLI module for azvm
//!
//! Argument parsing, operator prompts and console output.

pub mod interactive;
pub mod output;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// azvm - provision a single Azure VM with a generated administrator password
///
/// Looks up an existing Key Vault, stores a freshly generated password in it,
/// then creates a virtual network, subnet, network security group, network
/// interface and virtual machine in the vault's region.
#[derive(Parser, Debug, Clone)]
#[command(name = "azvm")]
#[command(author = "azvm Contributors")]
#[command(version)]
#[command(about = "Provision an Azure VM with a Key Vault stored password", long_about = None)]
pub struct Cli {
    /// Name of the virtual machine to create
    #[arg(long, env = "AZVM_VM_NAME")]
    pub vm_name: Option<String>,

    /// Administrator account name for the virtual machine
    #[arg(long, env = "AZVM_ADMIN_USERNAME")]
    pub admin_username: Option<String>,

    /// Path to configuration file
    #[arg(short = 'c', long, env = "AZVM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, default_value = "human")]
    pub output: OutputFormat,

    /// Log format for diagnostics on stderr
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// A single JSON report for scripting
    Json,
}

/// Log record format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Plain text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}
