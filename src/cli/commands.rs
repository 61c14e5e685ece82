//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - serve: run the disk-health tool server
//! - client: talk to a running server (tools, disks, smart, ping)

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// diskmon - disk health diagnostics over an event-stream tool server
#[derive(Parser, Debug)]
#[command(name = "diskmon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tool server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Call a running server
    Client {
        /// Event-stream URL, e.g. http://127.0.0.1:6666/sse
        #[arg(short, long)]
        url: Option<String>,

        #[command(subcommand)]
        command: ClientCommands,
    },
}

/// Client subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ClientCommands {
    /// List the tools the server offers
    Tools,

    /// Show the block device tree
    Disks,

    /// SMART health of one device
    Smart {
        /// Device path
        #[arg(default_value = "/dev/sda")]
        device: String,
    },

    /// Connect, discover and disconnect
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from(["diskmon", "serve", "--host", "127.0.0.1", "-p", "7000"]).unwrap();
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(7000));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_client_smart_default_device() {
        let cli = Cli::try_parse_from(["diskmon", "client", "smart"]).unwrap();
        match cli.command {
            Commands::Client {
                url: None,
                command: ClientCommands::Smart { device },
            } => assert_eq!(device, "/dev/sda"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_client_url_and_global_flags() {
        let cli = Cli::try_parse_from([
            "diskmon",
            "client",
            "--url",
            "http://10.0.0.5:6666/sse",
            "disks",
            "--verbose",
            "--config",
            "/tmp/diskmon.yml",
        ])
        .unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/diskmon.yml")));
        assert!(matches!(
            cli.command,
            Commands::Client {
                command: ClientCommands::Disks,
                ..
            }
        ));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["diskmon"]).is_err());
    }
}
