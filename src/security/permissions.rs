//! Permission sets and the mediator that gates every tool call.
//!
//! The mediator is consulted with (agent permission set, tool's required
//! permission, permission mode) before a tool executes. Outcomes:
//!
//! - allow without prompt (mode `auto`, or the tool only needs `read`)
//! - prompt (mode `suggest`/`ask`, non-read tool) — decided by the injected
//!   [`ApprovalHandler`]
//! - deny
//!
//! A denial is a tool-level error surfaced back to the model as an
//! `ERROR: permission denied …` tool message; it never aborts the loop.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ─── Permission model ──────────────────────────────────────────────────────

/// A single capability a tool may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Execute,
    Spawn,
    Web,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Execute => "execute",
            Permission::Spawn => "spawn",
            Permission::Web => "web",
        };
        write!(f, "{s}")
    }
}

/// The capabilities granted to one agent kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PermissionSet {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub spawn: bool,
    pub web: bool,
}

impl PermissionSet {
    pub const fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            execute: false,
            spawn: false,
            web: false,
        }
    }

    pub const fn all() -> Self {
        Self {
            read: true,
            write: true,
            execute: true,
            spawn: true,
            web: true,
        }
    }

    pub const fn with_write(mut self) -> Self {
        self.write = true;
        self
    }

    pub const fn with_execute(mut self) -> Self {
        self.execute = true;
        self
    }

    pub const fn with_spawn(mut self) -> Self {
        self.spawn = true;
        self
    }

    pub const fn with_web(mut self) -> Self {
        self.web = true;
        self
    }

    /// Whether this set grants the given permission.
    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::Read => self.read,
            Permission::Write => self.write,
            Permission::Execute => self.execute,
            Permission::Spawn => self.spawn,
            Permission::Web => self.web,
        }
    }
}

/// How the mediator treats non-read tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    /// Everything the agent's permission set allows runs without prompting.
    Auto,
    /// Non-read tools go through the approval handler.
    #[default]
    Suggest,
    /// Like `Suggest`; kept distinct so a UI can render a harder prompt.
    Ask,
}

/// Decision for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Prompt,
    Deny(String),
}

// ─── Approval ──────────────────────────────────────────────────────────────

/// A pending approval surfaced to the embedding application.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool: String,
    pub agent: String,
    pub required: Permission,
}

/// Decides prompted tool calls. The core ships no interactive prompt; the
/// CLI injects a handler wired to its flags.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn approve(&self, request: &ApprovalRequest) -> bool;
}

/// Approves every prompted call (CLI `--auto`).
pub struct AutoApprove;

#[async_trait]
impl ApprovalHandler for AutoApprove {
    async fn approve(&self, _request: &ApprovalRequest) -> bool {
        true
    }
}

/// Denies every prompted call. The safe default for headless runs.
pub struct DenyAll;

#[async_trait]
impl ApprovalHandler for DenyAll {
    async fn approve(&self, _request: &ApprovalRequest) -> bool {
        false
    }
}

// ─── Audit log ─────────────────────────────────────────────────────────────

/// One entry in the mediator's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub tool: String,
    pub agent: String,
    pub decision: String,
    pub reason: Option<String>,
}

// ─── Mediator ──────────────────────────────────────────────────────────────

/// Gates every tool call. Shared across executors via `Arc`.
pub struct PermissionMediator {
    mode: PermissionMode,
    handler: Arc<dyn ApprovalHandler>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl PermissionMediator {
    pub fn new(mode: PermissionMode, handler: Arc<dyn ApprovalHandler>) -> Self {
        Self {
            mode,
            handler,
            audit: Mutex::new(Vec::new()),
        }
    }

    /// Pure decision over (agent permissions, required permission, mode).
    pub fn evaluate(&self, permissions: &PermissionSet, required: Permission) -> Decision {
        if !permissions.allows(required) {
            return Decision::Deny(format!("agent permission set lacks '{required}'"));
        }
        if required == Permission::Read {
            return Decision::Allow;
        }
        match self.mode {
            PermissionMode::Auto => Decision::Allow,
            PermissionMode::Suggest | PermissionMode::Ask => Decision::Prompt,
        }
    }

    /// Full authorization: evaluate, consult the approval handler on
    /// `Prompt`, and record the outcome in the audit trail.
    ///
    /// Returns the denial reason on failure; the caller turns it into an
    /// `ERROR: permission denied …` tool message and continues the loop.
    pub async fn authorize(
        &self,
        permissions: &PermissionSet,
        required: Permission,
        tool: &str,
        agent: &str,
    ) -> Result<(), String> {
        let decision = self.evaluate(permissions, required);
        match decision {
            Decision::Allow => {
                self.record(tool, agent, "allowed", None);
                Ok(())
            }
            Decision::Prompt => {
                let request = ApprovalRequest {
                    tool: tool.to_string(),
                    agent: agent.to_string(),
                    required,
                };
                if self.handler.approve(&request).await {
                    self.record(tool, agent, "approved", None);
                    Ok(())
                } else {
                    let reason = format!("user declined '{tool}' for agent '{agent}'");
                    self.record(tool, agent, "denied", Some(&reason));
                    Err(reason)
                }
            }
            Decision::Deny(reason) => {
                self.record(tool, agent, "denied", Some(&reason));
                Err(reason)
            }
        }
    }

    fn record(&self, tool: &str, agent: &str, decision: &str, reason: Option<&str>) {
        let entry = AuditEntry {
            timestamp: chrono::Utc::now(),
            tool: tool.to_string(),
            agent: agent.to_string(),
            decision: decision.to_string(),
            reason: reason.map(str::to_string),
        };
        self.audit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    /// Snapshot of the audit log (newest last).
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
