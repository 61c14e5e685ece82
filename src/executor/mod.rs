//! Command executor
//!
//! Runs the SMART and block-device enumeration commands on the host (or a
//! configured remote host) and hands raw output to the normalizer.

pub mod command;
pub mod pool;
pub mod runner;
pub mod smart;

use std::sync::Arc;

use log::{debug, warn};

use crate::config::ExecutorConfig;
use crate::error::{DiskmonError, Result};
use crate::normalize::DeviceForest;

pub use pool::WorkerPool;
pub use runner::{CommandLine, CommandOutput, CommandRunner, ScriptedRunner, SystemRunner};
pub use smart::{SmartCheckResult, validate_device_path};

/// Disk diagnostics on top of a `CommandRunner`
#[derive(Clone)]
pub struct DiskExecutor {
    runner: Arc<dyn CommandRunner>,
    config: ExecutorConfig,
}

impl DiskExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ExecutorConfig) -> Self {
        Self { runner, config }
    }

    /// Executor backed by real processes
    pub fn system(config: ExecutorConfig) -> Self {
        Self::new(Arc::new(SystemRunner::new()), config)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// SMART health of one device.
    ///
    /// Only a rejected path is an `Err`; every failure after validation is
    /// folded into an ERROR result carrying the diagnostic text.
    pub async fn check_disk_smart(&self, device: &str) -> Result<SmartCheckResult> {
        validate_device_path(device)?;

        let command = command::smart_health(&self.config, device);
        let result = match self.runner.run(&command).await {
            Ok(output) => SmartCheckResult::from_output(device, &output),
            Err(e) => {
                warn!("SMART check of {} failed to run: {}", device, e);
                SmartCheckResult::from_error(device, &e)
            }
        };

        debug!("SMART check of {}: {}", device, result.status);
        Ok(result)
    }

    /// Enumerate block devices as a forest
    pub async fn list_disks(&self) -> Result<DeviceForest> {
        let command = command::list_block_devices(&self.config);
        let output = self.runner.run(&command).await?;

        if output.command_not_found() {
            return Err(DiskmonError::CommandUnavailable(runner::truncate(
                &output.combined(),
                smart::MAX_DETAIL_CHARS,
            )));
        }
        if !output.success() {
            let detail = output.combined();
            return Err(DiskmonError::Execution(format!(
                "lsblk exited with {:?}: {}",
                output.exit_code,
                runner::truncate(&detail, smart::MAX_DETAIL_CHARS)
            )));
        }

        let forest = DeviceForest::from_json(&output.stdout)?;
        debug!("Enumerated {} block devices", forest.len());
        Ok(forest)
    }
}
