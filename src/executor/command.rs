//! Argument vectors for the diagnostic commands.

use std::time::Duration;

use crate::config::{ExecutorConfig, RemoteConfig};

use super::runner::CommandLine;

/// Columns requested from lsblk, in output order
pub const LSBLK_COLUMNS: &str = "NAME,SIZE,TYPE,MOUNTPOINT";

/// `smartctl -H <device>`; `device` must already be validated
pub fn smart_health(config: &ExecutorConfig, device: &str) -> CommandLine {
    wrap(config, &config.smartctl_path, &["-H", device])
}

/// `lsblk -J -o NAME,SIZE,TYPE,MOUNTPOINT`
pub fn list_block_devices(config: &ExecutorConfig) -> CommandLine {
    wrap(config, &config.lsblk_path, &["-J", "-o", LSBLK_COLUMNS])
}

fn wrap(config: &ExecutorConfig, program: &str, args: &[&str]) -> CommandLine {
    let mut argv: Vec<String> = Vec::with_capacity(args.len() + 3);
    if config.use_sudo {
        argv.extend(["sudo".to_string(), "-n".to_string()]);
    }
    argv.push(program.to_string());
    argv.extend(args.iter().map(|a| a.to_string()));

    let timeout = Duration::from_millis(config.timeout_ms);
    match &config.remote {
        None => {
            let mut argv = argv.into_iter();
            let launcher = argv.next().unwrap_or_default();
            let line = CommandLine::new(launcher).args(argv).with_timeout(timeout);
            if config.use_sudo { line.requires(program) } else { line }
        }
        Some(remote) => CommandLine::new("ssh")
            .args(ssh_options(remote))
            .args(argv)
            .with_timeout(timeout + Duration::from_secs(remote.connect_timeout_secs)),
    }
}

fn ssh_options(remote: &RemoteConfig) -> Vec<String> {
    vec![
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", remote.connect_timeout_secs),
        "-p".to_string(),
        remote.port.to_string(),
        format!("{}@{}", remote.user, remote.host),
    ]
}
