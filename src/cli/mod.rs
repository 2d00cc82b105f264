//! CLI module for promptmill - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
