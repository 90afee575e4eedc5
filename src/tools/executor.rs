//! Tool invocation path shared by every agent executor.
//!
//! Validates the agent's allowlist, argument types, and permissions before a
//! tool runs; a failure at any step produces a failed outcome with no side
//! effect. Emits `tool:before` / `tool:after` events around execution.

use std::sync::Arc;

use serde_json::Value;

use crate::event_bus::{EventBus, RuntimeEvent};
use crate::security::{PermissionMediator, PermissionSet};

use super::registry::ToolRegistry;
use super::schema::validate_args;
use super::traits::ToolContext;

/// Outcome of one mediated tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub output: String,
    pub success: bool,
    pub metadata: Option<Value>,
}

impl ToolOutcome {
    fn failure(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            metadata: None,
        }
    }
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    mediator: Arc<PermissionMediator>,
    bus: Option<Arc<dyn EventBus>>,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        mediator: Arc<PermissionMediator>,
        bus: Option<Arc<dyn EventBus>>,
    ) -> Self {
        Self {
            registry,
            mediator,
            bus,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Invoke one tool on behalf of an agent.
    ///
    /// Never returns `Err`: every failure mode (unknown tool, allowlist
    /// violation, bad arguments, permission denial, execution error) is a
    /// failed [`ToolOutcome`] the caller feeds back to the model.
    #[tracing::instrument(name = "tool.invoke", skip_all, fields(tool = %tool_name, agent = %agent))]
    pub async fn invoke(
        &self,
        agent: &str,
        permissions: &PermissionSet,
        tool_name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> ToolOutcome {
        self.emit(RuntimeEvent::ToolBefore {
            tool: tool_name.to_string(),
            agent: agent.to_string(),
        });

        let outcome = self.invoke_inner(agent, permissions, tool_name, args, ctx).await;

        self.emit(RuntimeEvent::ToolAfter {
            tool: tool_name.to_string(),
            agent: agent.to_string(),
            success: outcome.success,
        });
        outcome
    }

    async fn invoke_inner(
        &self,
        agent: &str,
        permissions: &PermissionSet,
        tool_name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> ToolOutcome {
        let Some(tool) = self.registry.get(tool_name) else {
            return ToolOutcome::failure(format!("unknown tool '{tool_name}'"));
        };

        if !self.registry.allowed_for(agent, tool_name) {
            return ToolOutcome::failure(format!(
                "tool '{tool_name}' is not available to agent '{agent}'"
            ));
        }

        // Permission gate before anything can take effect.
        if let Err(reason) = self
            .mediator
            .authorize(permissions, tool.required_permission(), tool_name, agent)
            .await
        {
            return ToolOutcome::failure(format!("permission denied: {reason}"));
        }

        if let Err(reason) = validate_args(&tool.parameters_schema(), &args) {
            return ToolOutcome::failure(format!("invalid arguments: {reason}"));
        }

        match tool.execute(args, ctx).await {
            Ok(result) => ToolOutcome {
                output: result.output,
                success: result.success,
                metadata: result.metadata,
            },
            Err(e) => ToolOutcome::failure(e),
        }
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(bus) = &self.bus {
            let _ = bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::security::{
        AutoApprove, Permission, PermissionMode, SandboxProfile,
    };
    use crate::tools::traits::{Tool, ToolResult};

    struct CountingTool {
        permission: Permission,
        executions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "counting"
        }
        fn description(&self) -> &str {
            "Counts executions"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "value": { "type": "string" } },
                "required": ["value"]
            })
        }
        fn required_permission(&self) -> Permission {
            self.permission
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::ok(
                args.get("value").and_then(Value::as_str).unwrap_or("").to_string(),
            ))
        }
    }

    fn harness(permission: Permission) -> (ToolExecutor, Arc<AtomicUsize>) {
        let executions = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingTool {
            permission,
            executions: executions.clone(),
        }));
        registry.assign("code", &["counting"]);

        let mediator = Arc::new(PermissionMediator::new(
            PermissionMode::Auto,
            Arc::new(AutoApprove),
        ));
        (
            ToolExecutor::new(Arc::new(registry), mediator, None),
            executions,
        )
    }

    fn ctx() -> ToolContext {
        ToolContext::new(PathBuf::from("/tmp"), SandboxProfile::read_only())
    }

    #[tokio::test]
    async fn executes_allowed_tool() {
        let (executor, executions) = harness(Permission::Read);
        let outcome = executor
            .invoke(
                "code",
                &PermissionSet::read_only(),
                "counting",
                json!({"value": "hi"}),
                &ctx(),
            )
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.output, "hi");
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permission_denial_has_no_side_effect() {
        let (executor, executions) = harness(Permission::Write);
        let outcome = executor
            .invoke(
                "code",
                &PermissionSet::read_only(),
                "counting",
                json!({"value": "hi"}),
                &ctx(),
            )
            .await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("permission denied"));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_arguments_block_execution() {
        let (executor, executions) = harness(Permission::Read);
        let outcome = executor
            .invoke("code", &PermissionSet::read_only(), "counting", json!({}), &ctx())
            .await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("invalid arguments"));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool_reports_failure() {
        let (executor, _) = harness(Permission::Read);
        let outcome = executor
            .invoke("code", &PermissionSet::read_only(), "missing", json!({}), &ctx())
            .await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("unknown tool"));
    }

    #[tokio::test]
    async fn allowlist_violation_reports_failure() {
        let (executor, executions) = harness(Permission::Read);
        let outcome = executor
            .invoke(
                "search",
                &PermissionSet::read_only(),
                "counting",
                json!({"value": "x"}),
                &ctx(),
            )
            .await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("not available"));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }
}
