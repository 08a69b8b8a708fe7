//! Command line argument parsing
//!
//! Developer entry point with subcommands:
//! - `test`: resolve and run a single unit
//! - `stats`: print execution statistics
//! - `route-test`: route sample triggers, show the queue, optionally dispatch
//! - `show-config`: show configuration discovery information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Unit run by `autobrain test` when no name is given
pub const DEFAULT_TEST_UNIT: &str = "test_script";

#[derive(Debug, PartialEq)]
pub enum ExecutionMode {
    Test { unit: String },
    Stats,
    RouteTest { dispatch: Option<usize> },
    ShowConfig,
}

#[derive(Debug, Parser)]
#[command(name = "autobrain")]
#[command(author = "Autobrain Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Priority task routing and bounded task execution")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path (skips discovery)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve and run one unit as a test task
    Test {
        /// Unit name to run
        #[arg(short = 'n', long = "name")]
        name: Option<String>,
    },
    /// Print execution statistics
    Stats,
    /// Route sample triggers and print the resulting queue
    RouteTest {
        /// Dispatch up to N tasks after routing
        #[arg(short = 'd', long = "dispatch", value_name = "N")]
        dispatch: Option<usize>,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Test { name }) => Ok(ExecutionMode::Test {
                unit: name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TEST_UNIT.to_string()),
            }),
            Some(Commands::Stats) => Ok(ExecutionMode::Stats),
            Some(Commands::RouteTest { dispatch }) => Ok(ExecutionMode::RouteTest {
                dispatch: *dispatch,
            }),
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => Err(
                "No command specified. Use 'autobrain --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}
