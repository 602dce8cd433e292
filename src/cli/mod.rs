//! CLI module - argument parsing and command dispatch

pub mod args;
pub mod commands;
pub mod helpers;
pub mod logging;
pub mod table;

pub use args::{Cli, Commands, GlobalOpts, OutputFormat, ResourceKind};
