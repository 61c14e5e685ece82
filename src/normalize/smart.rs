//! SMART verdict extraction from `smartctl -H` output.

use serde::{Deserialize, Serialize};

/// smartctl exit status bit set when the disk reports itself failing
pub const EXIT_DISK_FAILING: i32 = 1 << 3;

/// smartctl exit status bit set when the device could not be opened
pub const EXIT_DEVICE_OPEN_FAILED: i32 = 1 << 1;

/// smartctl exit status bit set when the command line did not parse
pub const EXIT_COMMAND_LINE_ERROR: i32 = 1 << 0;

/// Exit status a shell reports for a command it could not find
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// True when `code` is a status smartctl itself produced after talking to
/// the device. Launcher failures (ssh 255, shell 126/127, signals) and
/// smartctl's own usage/open errors are not.
pub fn smartctl_ran(code: i32) -> bool {
    (0..128).contains(&code) && code & (EXIT_COMMAND_LINE_ERROR | EXIT_DEVICE_OPEN_FAILED) == 0
}

const PASSED_MARKERS: &[&str] = &["test result: passed", "smart health status: ok"];
const FAILED_MARKERS: &[&str] = &["test result: failed", "smart health status: failed"];
const UNSUPPORTED_MARKERS: &[&str] = &[
    "lacks smart capability",
    "smart support is: unavailable",
    "smart support is: disabled",
    "device does not support smart",
];

/// Health verdict of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SmartStatus {
    Passed,
    Failed,
    Unsupported,
    Error,
}

impl SmartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Unsupported => "UNSUPPORTED",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for SmartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one smartctl run.
///
/// Output markers win over the exit status. Without a marker, the failing bit
/// is a FAILED verdict only when smartctl itself produced the status.
pub fn classify(stdout: &str, stderr: &str, exit_code: Option<i32>) -> SmartStatus {
    let text = format!("{}\n{}", stdout, stderr).to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| text.contains(m));

    if contains_any(FAILED_MARKERS) {
        return SmartStatus::Failed;
    }
    if contains_any(PASSED_MARKERS) {
        return SmartStatus::Passed;
    }
    if contains_any(UNSUPPORTED_MARKERS) {
        return SmartStatus::Unsupported;
    }
    match exit_code {
        Some(code) if smartctl_ran(code) && code & EXIT_DISK_FAILING != 0 => SmartStatus::Failed,
        _ => SmartStatus::Error,
    }
}
