//! CLI module
//!
//! Command-line interface for the BitTorrent client.

pub mod args;
pub mod commands;
pub mod config;

pub use args::{CliArgs, Command};
pub use commands::{execute, print_info};
pub use config::Config;
