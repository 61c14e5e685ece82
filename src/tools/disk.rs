//! The two disk-health tools

use async_trait::async_trait;
use log::{error, warn};
use serde_json::{Map, Value};

use crate::error::DiskmonError;
use crate::executor::DiskExecutor;
use crate::normalize::SmartStatus;

use super::definition::{ParamSpec, ParamType, ToolSpec};
use super::registry::DiskTool;
use super::result::ToolInvocationResult;

pub const CHECK_DISK_SMART: &str = "check_disk_smart";
pub const LIST_DISKS: &str = "list_disks";

/// Device checked when the caller names none
pub const DEFAULT_DEVICE: &str = "/dev/sda";

/// `check_disk_smart(device)`
pub struct SmartCheckTool {
    executor: DiskExecutor,
    spec: ToolSpec,
}

impl SmartCheckTool {
    pub fn new(executor: DiskExecutor) -> Self {
        let spec = ToolSpec::new(
            CHECK_DISK_SMART,
            "Query the SMART overall-health self-assessment of a block device. \
             Returns status PASSED, FAILED, UNSUPPORTED or ERROR with the raw diagnostic text.",
        )
        .with_param(
            ParamSpec::optional("device", ParamType::String, "Device path, e.g. /dev/sda or /dev/nvme0n1")
                .with_default(DEFAULT_DEVICE),
        );
        Self { executor, spec }
    }
}

#[async_trait]
impl DiskTool for SmartCheckTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, args: Map<String, Value>) -> ToolInvocationResult {
        let device = args.get("device").and_then(Value::as_str).unwrap_or(DEFAULT_DEVICE);

        let result = match self.executor.check_disk_smart(device).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Rejected SMART check: {}", e);
                return ToolInvocationResult::from_error(&e);
            }
        };

        let payload = match serde_json::to_value(&result) {
            Ok(payload) => payload,
            Err(e) => return ToolInvocationResult::from_error(&DiskmonError::Json(e)),
        };

        if result.status == SmartStatus::Error {
            let message = format!("{}: {}", device, result.detail);
            ToolInvocationResult::failure_with_payload(result.code, message, payload)
        } else {
            ToolInvocationResult::success(payload)
        }
    }
}

/// `list_disks()`
pub struct ListDisksTool {
    executor: DiskExecutor,
    spec: ToolSpec,
}

impl ListDisksTool {
    pub fn new(executor: DiskExecutor) -> Self {
        let spec = ToolSpec::new(
            LIST_DISKS,
            "List block devices (disks, partitions, RAID and loop devices) as a tree \
             with sizes in bytes and mount points.",
        );
        Self { executor, spec }
    }
}

#[async_trait]
impl DiskTool for ListDisksTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, _args: Map<String, Value>) -> ToolInvocationResult {
        match self.executor.list_disks().await {
            Ok(forest) => match serde_json::to_value(&forest) {
                Ok(payload) => ToolInvocationResult::success(payload),
                Err(e) => ToolInvocationResult::from_error(&DiskmonError::Json(e)),
            },
            Err(e @ DiskmonError::Parse(_)) => {
                error!("Failed to normalize block device enumeration: {}", e);
                ToolInvocationResult::from_error(&e)
            }
            Err(e) => {
                warn!("Block device enumeration failed: {}", e);
                ToolInvocationResult::from_error(&e)
            }
        }
    }
}
