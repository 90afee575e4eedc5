use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::types::ToolDefinition;
use crate::security::{Permission, SandboxProfile};

/// The result of executing a [`Tool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Human-readable output (stdout, file contents, directory listing, etc.).
    pub output: String,
    /// Whether the tool considered the execution successful.
    pub success: bool,
    /// Optional structured metadata for machine consumption.
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
            metadata: None,
        }
    }

    pub fn err(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Execution context handed to every tool call.
///
/// Carries the workspace root (relative paths resolve against it) and the
/// executing agent's sandbox profile.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub working_dir: PathBuf,
    pub sandbox: SandboxProfile,
    pub sandbox_enabled: bool,
}

impl ToolContext {
    pub fn new(working_dir: PathBuf, sandbox: SandboxProfile) -> Self {
        Self {
            working_dir,
            sandbox,
            sandbox_enabled: true,
        }
    }

    /// Resolve a possibly-relative path against the workspace root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            self.working_dir.join(p)
        }
    }
}

/// A capability that an agent executor can invoke.
///
/// Implementations must be `Send + Sync` so they can be held in a shared
/// `Arc<dyn Tool>` registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable machine identifier (snake_case), e.g. `"shell"`.
    fn name(&self) -> &str;

    /// Human-readable description used in LLM tool payloads.
    fn description(&self) -> &str;

    /// JSON Schema object describing the tool's accepted parameters.
    fn parameters_schema(&self) -> Value;

    /// The permission an agent must hold for this tool to run.
    fn required_permission(&self) -> Permission;

    /// Execute the tool with arguments already validated against the schema.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String>;
}

/// Summary of a registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub required_permission: Permission,
}

impl ToolInfo {
    /// The function-calling descriptor handed to the LLM.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::function(&self.name, &self.description, self.schema.clone())
    }
}
