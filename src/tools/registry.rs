use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::ai::types::ToolDefinition;

use super::traits::{Tool, ToolInfo};

/// Central registry of available tools, plus the per-agent allowlists that
/// scope what each agent kind may call.
///
/// Definition lists handed to the LLM are cached per agent and the cache is
/// invalidated on every registry mutation (tool registration, allowlist
/// assignment or append).
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    agent_tools: HashMap<String, Vec<String>>,
    definitions_cache: Mutex<HashMap<String, Arc<Vec<ToolDefinition>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            agent_tools: HashMap::new(),
            definitions_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
        self.invalidate_cache();
    }

    /// Replace the allowlist for one agent kind.
    pub fn assign(&mut self, agent: &str, tool_names: &[&str]) {
        self.agent_tools.insert(
            agent.to_string(),
            tool_names.iter().map(|s| s.to_string()).collect(),
        );
        self.invalidate_cache();
    }

    /// Append tools to an agent's allowlist, creating it if absent.
    pub fn append(&mut self, agent: &str, tool_names: &[&str]) {
        let entry = self.agent_tools.entry(agent.to_string()).or_default();
        for name in tool_names {
            if !entry.iter().any(|n| n == name) {
                entry.push(name.to_string());
            }
        }
        self.invalidate_cache();
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Whether `agent` may call `tool_name`. Agents with no allowlist may
    /// call nothing.
    pub fn allowed_for(&self, agent: &str, tool_name: &str) -> bool {
        self.agent_tools
            .get(agent)
            .is_some_and(|names| names.iter().any(|n| n == tool_name))
    }

    /// List all registered tools.
    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                schema: t.parameters_schema(),
                required_permission: t.required_permission(),
            })
            .collect()
    }

    /// Function-calling definitions for the tools an agent may use, in the
    /// order of its allowlist. Cached until the next registry mutation.
    pub fn definitions_for(&self, agent: &str) -> Arc<Vec<ToolDefinition>> {
        {
            let cache = self
                .definitions_cache
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(defs) = cache.get(agent) {
                return defs.clone();
            }
        }

        let defs: Vec<ToolDefinition> = self
            .agent_tools
            .get(agent)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| self.tools.get(n))
                    .map(|t| {
                        ToolDefinition::function(
                            t.name(),
                            t.description(),
                            t.parameters_schema(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let defs = Arc::new(defs);
        self.definitions_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(agent.to_string(), defs.clone());
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn invalidate_cache(&self) {
        self.definitions_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use crate::security::Permission;
    use crate::tools::traits::{ToolContext, ToolResult};

    struct DummyTool(&'static str);

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "A test tool"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn required_permission(&self) -> Permission {
            Permission::Read
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            Ok(ToolResult::ok("done"))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(DummyTool("dummy")));
        assert!(reg.get("dummy").is_some());
        assert!(reg.get("nonexistent").is_none());
    }

    #[test]
    fn allowlist_scopes_agents() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(DummyTool("file_read")));
        reg.register(Arc::new(DummyTool("shell")));
        reg.assign("search", &["file_read"]);

        assert!(reg.allowed_for("search", "file_read"));
        assert!(!reg.allowed_for("search", "shell"));
        assert!(!reg.allowed_for("code", "file_read"));
    }

    #[test]
    fn definitions_follow_allowlist_order() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(DummyTool("b")));
        reg.register(Arc::new(DummyTool("a")));
        reg.assign("code", &["a", "b"]);

        let defs = reg.definitions_for("code");
        let names: Vec<&str> = defs.iter().map(|d| d.function.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn definitions_cache_reused_until_mutation() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(DummyTool("a")));
        reg.assign("code", &["a"]);

        let first = reg.definitions_for("code");
        let second = reg.definitions_for("code");
        assert!(Arc::ptr_eq(&first, &second));

        reg.append("code", &["a"]);
        let third = reg.definitions_for("code");
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn unassigned_agent_gets_no_definitions() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(DummyTool("a")));
        assert!(reg.definitions_for("docs").is_empty());
    }

    #[test]
    fn append_deduplicates() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(DummyTool("a")));
        reg.register(Arc::new(DummyTool("b")));
        reg.assign("code", &["a"]);
        reg.append("code", &["a", "b"]);

        let defs = reg.definitions_for("code");
        assert_eq!(defs.len(), 2);
    }
}
