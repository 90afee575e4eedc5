use async_trait::async_trait;
use serde_json::{Value, json};

use crate::security::Permission;

use super::traits::{Tool, ToolContext, ToolResult};

// ─── FileReadTool ──────────────────────────────────────────────────────────

pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Use max_lines to limit output for large files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file (relative paths resolve against the workspace)." },
                "max_lines": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default: all).",
                    "minimum": 1
                }
            },
            "required": ["path"]
        })
    }

    fn required_permission(&self) -> Permission {
        Permission::Read
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let path = ctx.resolve(
            args.get("path")
                .and_then(Value::as_str)
                .ok_or("missing required argument 'path'")?,
        );

        if !ctx.sandbox.allows_read(&path) {
            return Err(format!("read of '{}' denied by sandbox profile", path.display()));
        }

        let max_lines = args.get("max_lines").and_then(Value::as_u64).map(|n| n as usize);

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;

        let output = match max_lines {
            Some(n) => contents.lines().take(n).collect::<Vec<_>>().join("\n"),
            None => contents,
        };

        Ok(ToolResult::ok(output).with_metadata(json!({ "path": path.display().to_string() })))
    }
}

// ─── FileWriteTool ─────────────────────────────────────────────────────────

pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it (and parent directories) if needed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file." },
                "content": { "type": "string", "description": "Full file content to write." }
            },
            "required": ["path", "content"]
        })
    }

    fn required_permission(&self) -> Permission {
        Permission::Write
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let path = ctx.resolve(
            args.get("path")
                .and_then(Value::as_str)
                .ok_or("missing required argument 'path'")?,
        );
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'content'")?;

        if !ctx.sandbox.allows_write(&path) {
            return Err(format!("write to '{}' denied by sandbox profile", path.display()));
        }

        let existed = path.exists();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create '{}': {e}", parent.display()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| format!("failed to write '{}': {e}", path.display()))?;

        let op = if existed { "modified" } else { "created" };
        Ok(ToolResult::ok(format!("{op} {} ({} bytes)", path.display(), content.len()))
            .with_metadata(json!({ "path": path.display().to_string(), "op": op })))
    }
}

// ─── FileListTool ──────────────────────────────────────────────────────────

pub struct FileListTool;

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "List the entries of a directory (non-recursive)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list (default: workspace root)." }
            }
        })
    }

    fn required_permission(&self) -> Permission {
        Permission::Read
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let path = match args.get("path").and_then(Value::as_str) {
            Some(p) => ctx.resolve(p),
            None => ctx.working_dir.clone(),
        };

        if !ctx.sandbox.allows_read(&path) {
            return Err(format!("read of '{}' denied by sandbox profile", path.display()));
        }

        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| format!("failed to list '{}': {e}", path.display()))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| format!("failed to read entry: {e}"))?
        {
            let kind = match entry.file_type().await {
                Ok(t) if t.is_dir() => "dir",
                Ok(_) => "file",
                Err(_) => "?",
            };
            names.push(format!("{kind}\t{}", entry.file_name().to_string_lossy()));
        }
        names.sort();

        Ok(ToolResult::ok(names.join("\n"))
            .with_metadata(json!({ "path": path.display().to_string(), "count": names.len() })))
    }
}
