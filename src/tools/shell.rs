use async_trait::async_trait;
use serde_json::{Value, json};

use crate::security::{HostPlatform, Permission, wrap_command};

use super::traits::{Tool, ToolContext, ToolResult};

/// Hard cap on how long a shell command may run.
const COMMAND_TIMEOUT_SECS: u64 = 120;

/// Executes shell commands inside the agent's sandbox profile.
///
/// The command string is rewritten into a host isolation invocation by
/// [`wrap_command`]; when sandboxing is disabled it runs via `/bin/sh -c`
/// unchanged.
pub struct ShellTool {
    platform: HostPlatform,
}

impl ShellTool {
    pub fn new() -> Self {
        Self {
            platform: HostPlatform::current(),
        }
    }

    /// Override the detected platform (used by tests).
    pub fn with_platform(platform: HostPlatform) -> Self {
        Self { platform }
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its stdout/stderr output. \
         Commands run inside the agent's sandbox profile."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute."
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional working directory for the command."
                }
            },
            "required": ["command"]
        })
    }

    fn required_permission(&self) -> Permission {
        Permission::Execute
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'command'")?;

        let working_dir = match args.get("working_dir").and_then(Value::as_str) {
            Some(dir) => ctx.resolve(dir),
            None => ctx.working_dir.clone(),
        };

        let argv = wrap_command(command, &ctx.sandbox, ctx.sandbox_enabled, self.platform);

        let mut cmd = tokio::process::Command::new(&argv[0]);
        cmd.args(&argv[1..]).current_dir(&working_dir).kill_on_drop(true);

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(COMMAND_TIMEOUT_SECS),
            cmd.output(),
        )
        .await
        .map_err(|_| format!("command timed out after {COMMAND_TIMEOUT_SECS}s"))?
        .map_err(|e| format!("failed to spawn process: {e}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let success = output.status.success();

        let combined = if stderr.is_empty() {
            stdout
        } else if stdout.is_empty() {
            format!("STDERR: {stderr}")
        } else {
            format!("{stdout}\nSTDERR: {stderr}")
        };

        let meta = json!({ "exit_code": output.status.code() });
        if success {
            Ok(ToolResult::ok(combined).with_metadata(meta))
        } else {
            Ok(ToolResult::err(combined).with_metadata(meta))
        }
    }
}
