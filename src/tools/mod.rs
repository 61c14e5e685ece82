//! Tool System - tool definitions, registry and the disk tools

mod definition;
mod disk;
mod registry;
mod result;

pub use definition::{ParamSpec, ParamType, ToolDescriptor, ToolSpec};
pub use disk::{CHECK_DISK_SMART, DEFAULT_DEVICE, LIST_DISKS, ListDisksTool, SmartCheckTool};
pub use registry::{DiskTool, ToolRegistry};
pub use result::{CallToolResult, ContentBlock, ToolInvocationRequest, ToolInvocationResult};
