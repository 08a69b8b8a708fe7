//! CLI-specific functionality for autobrain
//!
//! Argument parsing for the developer entry point. Configuration discovery
//! lives in [`crate::config`].

pub mod args;

pub use args::{Args, Commands, ExecutionMode};
