//! SMART health checks

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DiskmonError, Result, ResultCode};
use crate::normalize::smart::{EXIT_DEVICE_OPEN_FAILED, SmartStatus, classify};

use super::runner::{CommandOutput, truncate};

/// Longest device path accepted
pub const MAX_DEVICE_PATH_LEN: usize = 128;

/// Longest diagnostic text kept in a result
pub const MAX_DETAIL_CHARS: usize = 2000;

static DEVICE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/dev/[A-Za-z0-9_.:/-]+$").expect("valid device path pattern"));

/// Reject anything that does not look like a plain device node path.
///
/// Runs before any process is spawned.
pub fn validate_device_path(path: &str) -> Result<()> {
    if path.len() > MAX_DEVICE_PATH_LEN {
        return Err(DiskmonError::Validation(format!(
            "device path longer than {} bytes",
            MAX_DEVICE_PATH_LEN
        )));
    }
    if !DEVICE_PATH.is_match(path) {
        return Err(DiskmonError::Validation(format!(
            "'{}' is not a device path (expected /dev/<name>)",
            path
        )));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(DiskmonError::Validation(format!(
            "'{}' escapes /dev",
            path
        )));
    }
    Ok(())
}

/// Outcome of one SMART check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartCheckResult {
    pub device: String,
    pub status: SmartStatus,
    pub detail: String,
    #[serde(skip, default = "success_code")]
    pub code: ResultCode,
}

fn success_code() -> ResultCode {
    ResultCode::Success
}

impl SmartCheckResult {
    /// Interpret a completed smartctl run
    pub fn from_output(device: &str, output: &CommandOutput) -> Self {
        let status = classify(&output.stdout, &output.stderr, output.exit_code);
        let code = match status {
            SmartStatus::Error if output.command_not_found() => ResultCode::CommandUnavailable,
            SmartStatus::Error => match output.exit_code {
                Some(exit) if (0..128).contains(&exit) && exit & EXIT_DEVICE_OPEN_FAILED != 0 => {
                    ResultCode::DeviceUnavailable
                }
                _ => ResultCode::ExecutionFailed,
            },
            _ => ResultCode::Success,
        };
        let mut detail = output.combined();
        if status == SmartStatus::Error && detail.is_empty() {
            detail = format!("smartctl exited with {:?} and no output", output.exit_code);
        }
        Self {
            device: device.to_string(),
            status,
            detail: truncate(&detail, MAX_DETAIL_CHARS),
            code,
        }
    }

    /// The command never produced output
    pub fn from_error(device: &str, err: &DiskmonError) -> Self {
        Self {
            device: device.to_string(),
            status: SmartStatus::Error,
            detail: truncate(&err.to_string(), MAX_DETAIL_CHARS),
            code: ResultCode::from_error(err),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == SmartStatus::Passed
    }
}
