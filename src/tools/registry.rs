//! Tool registry
//!
//! Maps tool names to handlers. Built once at startup and shared read-only.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde_json::{Map, Value};

use crate::error::{DiskmonError, Result};
use crate::executor::DiskExecutor;

use super::definition::{ToolDescriptor, ToolSpec};
use super::disk::{ListDisksTool, SmartCheckTool};
use super::result::{ToolInvocationRequest, ToolInvocationResult};

/// A named operation callable through the registry
#[async_trait]
pub trait DiskTool: Send + Sync {
    /// Static name, description and parameters
    fn spec(&self) -> &ToolSpec;

    /// Run with arguments already validated against `spec()`
    async fn call(&self, args: Map<String, Value>) -> ToolInvocationResult;
}

/// Registered tools in registration order
#[derive(Clone, Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn DiskTool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The two disk tools, backed by `executor`
    pub fn standard(executor: DiskExecutor) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(SmartCheckTool::new(executor.clone())))?;
        registry.register(Arc::new(ListDisksTool::new(executor)))?;
        Ok(registry)
    }

    /// Add a tool; names must be unique
    pub fn register(&mut self, tool: Arc<dyn DiskTool>) -> Result<()> {
        let name = tool.spec().name.clone();
        if self.tools.contains_key(&name) {
            return Err(DiskmonError::DuplicateTool(name));
        }
        info!("Registered tool: {}", name);
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Descriptors in registration order
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec().descriptor())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DiskTool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Validate arguments and run the named tool.
    ///
    /// `Err` only for an unknown tool or arguments that do not fit the
    /// schema; handler failures come back as a failed result.
    pub async fn invoke(&self, request: ToolInvocationRequest) -> Result<ToolInvocationResult> {
        let tool = self
            .get(&request.tool)
            .ok_or_else(|| DiskmonError::UnknownTool(request.tool.clone()))?;
        let args = tool.spec().validate_args(&request.arguments)?;

        debug!("Invoking {} (id {}) with {:?}", request.tool, request.correlation_id, args);
        Ok(tool.call(args).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::error::ResultCode;
    use crate::executor::{CommandOutput, ScriptedRunner};
    use crate::tools::definition::{ParamSpec, ParamType};
    use serde_json::json;

    struct EchoTool {
        spec: ToolSpec,
    }

    impl EchoTool {
        fn new(name: &str) -> Self {
            Self {
                spec: ToolSpec::new(name, "Echo arguments")
                    .with_param(ParamSpec::required("text", ParamType::String, "Text to echo")),
            }
        }
    }

    #[async_trait]
    impl DiskTool for EchoTool {
        fn spec(&self) -> &ToolSpec {
            &self.spec
        }

        async fn call(&self, args: Map<String, Value>) -> ToolInvocationResult {
            ToolInvocationResult::success(args["text"].clone())
        }
    }

    fn standard() -> ToolRegistry {
        let runner = ScriptedRunner::new().respond_to("/dev/sda", CommandOutput::ok("test result: PASSED"));
        let executor = DiskExecutor::new(Arc::new(runner), ExecutorConfig::default());
        ToolRegistry::standard(executor).unwrap()
    }

    #[test]
    fn test_registry_new_empty() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("echo"))).unwrap();
        let err = registry.register(Arc::new(EchoTool::new("echo"))).unwrap_err();
        assert!(matches!(err, DiskmonError::DuplicateTool(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_in_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Arc::new(EchoTool::new(name))).unwrap();
        }
        let names: Vec<_> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_standard_catalog() {
        let registry = standard();
        assert_eq!(registry.names(), vec!["check_disk_smart", "list_disks"]);
        let smart = registry.get("check_disk_smart").unwrap();
        assert_eq!(smart.spec().param("device").unwrap().default, Some(json!("/dev/sda")));
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let err = standard()
            .invoke(ToolInvocationRequest::new("format_disk", Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DiskmonError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_invoke_invalid_arguments() {
        let args = json!({"device": 42}).as_object().cloned().unwrap();
        let err = standard()
            .invoke(ToolInvocationRequest::new("check_disk_smart", args))
            .await
            .unwrap_err();
        assert!(matches!(err, DiskmonError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_invoke_uses_default_device() {
        let result = standard()
            .invoke(ToolInvocationRequest::new("check_disk_smart", Map::new()))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.code, ResultCode::Success);
        assert_eq!(result.payload["device"], "/dev/sda");
        assert_eq!(result.payload["status"], "PASSED");
    }

    #[tokio::test]
    async fn test_invoke_custom_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("echo"))).unwrap();
        let args = json!({"text": "hi"}).as_object().cloned().unwrap();
        let result = registry.invoke(ToolInvocationRequest::new("echo", args)).await.unwrap();
        assert_eq!(result.payload, json!("hi"));
    }
}
