// CLI argument definitions using Clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Declarative functional-test runner for gRPC services
#[derive(Parser, Debug)]
#[command(name = "grpcsuite")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run declarative YAML test cases against gRPC services", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose debug output
    #[arg(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run all test cases
    Run(RunArgs),

    /// Check the configuration, descriptors included, without making RPC calls
    Validate(ValidateArgs),

    /// Create template configuration files
    Setup(SetupArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to configs directory
    #[arg(long, default_value = ".")]
    pub configs: PathBuf,

    /// User defined variables, format: key=value
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Run only a specific test case (and its dependencies), format: test_case_name
    #[arg(long, value_name = "NAME")]
    pub target: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Path to configs directory
    #[arg(long, default_value = ".")]
    pub configs: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SetupArgs {
    /// Directory to scaffold the configuration into
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}
