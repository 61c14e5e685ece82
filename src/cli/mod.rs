//! CLI module for diskmon - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the server
//! and calling it as a client.

pub mod commands;

pub use commands::Cli;
