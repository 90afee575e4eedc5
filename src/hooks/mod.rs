//! User-configured lifecycle hooks.
//!
//! Hooks are shell commands run at named lifecycle points with a structured
//! environment. They are advisory: a failing or timed-out hook logs a
//! warning and the main flow continues. Setting `blocking = true` makes a
//! failing `PreToolUse` hook cancel the tool call it precedes; no other
//! point ever blocks.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Named lifecycle points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookPoint {
    /// Before every tool execution. Env: `TOOL`, `AGENT`, `ARGS` (JSON).
    PreToolUse,
    /// After every tool execution. Env adds `SUCCESS`.
    PostToolUse,
    /// When a session ends. Env: `SESSION_ID`.
    SessionEnd,
    /// Before a session-level history compaction. No env.
    PreCompact,
}

impl HookPoint {
    pub fn name(&self) -> &'static str {
        match self {
            HookPoint::PreToolUse => "PreToolUse",
            HookPoint::PostToolUse => "PostToolUse",
            HookPoint::SessionEnd => "SessionEnd",
            HookPoint::PreCompact => "PreCompact",
        }
    }
}

/// Outcome of running the hooks at one point.
#[derive(Debug, Clone, Default)]
pub struct HookOutcome {
    pub ran: usize,
    pub failures: Vec<String>,
}

impl HookOutcome {
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Executes configured shell hooks.
pub struct HookRunner {
    hooks: HashMap<HookPoint, Vec<String>>,
    timeout: Duration,
    blocking: bool,
}

impl HookRunner {
    pub fn new(timeout: Duration, blocking: bool) -> Self {
        Self {
            hooks: HashMap::new(),
            timeout,
            blocking,
        }
    }

    /// A runner with nothing configured; every point is a no-op.
    pub fn disabled() -> Self {
        Self::new(Duration::from_secs(10), false)
    }

    /// Register a shell command at a lifecycle point.
    pub fn register(&mut self, point: HookPoint, command: impl Into<String>) {
        self.hooks.entry(point).or_default().push(command.into());
    }

    /// Whether a failing `PreToolUse` hook cancels the tool call.
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Run all hooks registered at `point` with the given environment.
    ///
    /// Hooks run sequentially in registration order. Failures never
    /// propagate as errors; they are collected into the outcome and logged.
    pub async fn run(&self, point: HookPoint, env: &[(&str, String)]) -> HookOutcome {
        let Some(commands) = self.hooks.get(&point) else {
            return HookOutcome::default();
        };

        let mut outcome = HookOutcome::default();
        for command in commands {
            outcome.ran += 1;
            if let Err(reason) = self.run_one(command, env).await {
                log::warn!("{} hook '{command}' failed: {reason}", point.name());
                outcome.failures.push(reason);
            }
        }
        outcome
    }

    async fn run_one(&self, command: &str, env: &[(&str, String)]) -> Result<(), String> {
        let mut cmd = tokio::process::Command::new("/bin/sh");
        cmd.arg("-c").arg(command).kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let status = tokio::time::timeout(self.timeout, cmd.status())
            .await
            .map_err(|_| format!("timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| format!("failed to spawn: {e}"))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("exited with {status}"))
        }
    }
}
