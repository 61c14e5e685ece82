//! Terminal rendering for client results

use colored::*;

use crate::executor::SmartCheckResult;
use crate::normalize::{DeviceForest, SmartStatus};
use crate::tools::{ToolInvocationResult, ToolSpec};

/// Status word colored by severity
pub fn status_label(status: SmartStatus) -> ColoredString {
    match status {
        SmartStatus::Passed => "PASSED".green(),
        SmartStatus::Failed => "FAILED".red(),
        SmartStatus::Unsupported => "UNSUPPORTED".yellow(),
        SmartStatus::Error => "ERROR".red().bold(),
    }
}

/// `/dev/sda: PASSED` followed by the detail when the check did not pass
pub fn render_smart(result: &SmartCheckResult) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", result.device.bold(), status_label(result.status))];
    if result.status != SmartStatus::Passed && !result.detail.is_empty() {
        lines.extend(result.detail.lines().map(|line| format!("  {}", line.dimmed())));
    }
    lines
}

pub fn render_forest(forest: &DeviceForest) -> Vec<String> {
    if forest.is_empty() {
        return vec!["no block devices".dimmed().to_string()];
    }
    forest.lines().collect()
}

/// Single line: `error 1002: command execution failed`
pub fn render_failure(result: &ToolInvocationResult) -> String {
    format!("{} {}: {}", "error".red().bold(), result.code, result.message())
}

pub fn render_catalog(catalog: &[ToolSpec]) -> Vec<String> {
    let mut lines = Vec::new();
    for spec in catalog {
        lines.push(format!("{}  {}", spec.name.cyan().bold(), spec.description));
        for param in &spec.params {
            let mut line = format!("    {} ({})", param.name, param.param_type.as_str());
            if param.required {
                line.push_str(" required");
            }
            if let Some(default) = &param.default {
                line.push_str(&format!(" default={}", default));
            }
            if !param.description.is_empty() {
                line.push_str(&format!("  {}", param.description.dimmed()));
            }
            lines.push(line);
        }
    }
    lines
}
