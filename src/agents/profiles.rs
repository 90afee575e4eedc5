//! The closed set of agent kinds and their static execution profiles.
//!
//! A profile fixes what an agent kind may do before any task runs: its
//! permission set, tool allowlist, turn cap, wall-clock timeouts, sandbox
//! shape, and whether the shared project context is injected into its
//! prompts. Profiles are data, not configuration; they change only with the
//! code.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::security::{PermissionSet, SandboxProfile};

/// Specialist agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Orchestrator,
    Search,
    Research,
    Code,
    Review,
    Test,
    Docs,
    Qa,
    Init,
}

impl AgentKind {
    pub fn all() -> &'static [AgentKind] {
        &[
            AgentKind::Orchestrator,
            AgentKind::Search,
            AgentKind::Research,
            AgentKind::Code,
            AgentKind::Review,
            AgentKind::Test,
            AgentKind::Docs,
            AgentKind::Qa,
            AgentKind::Init,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Orchestrator => "orchestrator",
            AgentKind::Search => "search",
            AgentKind::Research => "research",
            AgentKind::Code => "code",
            AgentKind::Review => "review",
            AgentKind::Test => "test",
            AgentKind::Docs => "docs",
            AgentKind::Qa => "qa",
            AgentKind::Init => "init",
        }
    }

    /// Kinds whose failure warrants a visible warning in the final reply.
    pub fn is_core(&self) -> bool {
        matches!(self, AgentKind::Search | AgentKind::Code | AgentKind::Test)
    }

    /// How filesystem access is shaped for this kind.
    fn sandbox_kind(&self) -> SandboxKind {
        match self {
            AgentKind::Code | AgentKind::Test | AgentKind::Qa | AgentKind::Docs | AgentKind::Init => {
                SandboxKind::WorkspaceWrite
            }
            _ => SandboxKind::ReadOnly,
        }
    }

    /// The static execution profile for this kind.
    pub fn profile(&self) -> AgentProfile {
        match self {
            AgentKind::Orchestrator => AgentProfile {
                kind: *self,
                permissions: PermissionSet::read_only().with_spawn(),
                tools: &[],
                max_turns: 8,
                default_timeout_secs: 300,
                max_timeout_secs: 600,
                include_project_context: true,
                model_suffix: None,
            },
            AgentKind::Search => AgentProfile {
                kind: *self,
                permissions: PermissionSet::read_only(),
                tools: &["file_read", "file_list"],
                max_turns: 10,
                default_timeout_secs: 60,
                max_timeout_secs: 120,
                include_project_context: true,
                model_suffix: None,
            },
            AgentKind::Research => AgentProfile {
                kind: *self,
                permissions: PermissionSet::read_only().with_web(),
                tools: &["file_read", "web_fetch"],
                max_turns: 12,
                default_timeout_secs: 120,
                max_timeout_secs: 240,
                include_project_context: true,
                model_suffix: Some(":online"),
            },
            AgentKind::Code => AgentProfile {
                kind: *self,
                permissions: PermissionSet::read_only().with_write().with_execute(),
                tools: &["file_read", "file_write", "file_list", "shell"],
                max_turns: 25,
                default_timeout_secs: 300,
                max_timeout_secs: 600,
                include_project_context: true,
                model_suffix: None,
            },
            AgentKind::Review => AgentProfile {
                kind: *self,
                permissions: PermissionSet::read_only(),
                tools: &["file_read", "file_list"],
                max_turns: 10,
                default_timeout_secs: 120,
                max_timeout_secs: 240,
                include_project_context: true,
                model_suffix: None,
            },
            AgentKind::Test => AgentProfile {
                kind: *self,
                permissions: PermissionSet::read_only().with_execute(),
                tools: &["file_read", "file_list", "shell"],
                max_turns: 15,
                default_timeout_secs: 300,
                max_timeout_secs: 600,
                include_project_context: true,
                model_suffix: None,
            },
            AgentKind::Docs => AgentProfile {
                kind: *self,
                permissions: PermissionSet::read_only().with_write(),
                tools: &["file_read", "file_write", "file_list"],
                max_turns: 12,
                default_timeout_secs: 180,
                max_timeout_secs: 360,
                include_project_context: true,
                model_suffix: None,
            },
            AgentKind::Qa => AgentProfile {
                kind: *self,
                permissions: PermissionSet::read_only().with_execute(),
                tools: &["file_read", "file_list", "shell"],
                max_turns: 12,
                default_timeout_secs: 180,
                max_timeout_secs: 360,
                include_project_context: true,
                model_suffix: None,
            },
            AgentKind::Init => AgentProfile {
                kind: *self,
                permissions: PermissionSet::read_only().with_write(),
                tools: &["file_read", "file_write", "file_list"],
                max_turns: 10,
                default_timeout_secs: 60,
                max_timeout_secs: 120,
                // Init produces the project context; injecting a stale one
                // would bias it.
                include_project_context: false,
                model_suffix: None,
            },
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "orchestrator" => Ok(AgentKind::Orchestrator),
            "search" => Ok(AgentKind::Search),
            "research" => Ok(AgentKind::Research),
            "code" => Ok(AgentKind::Code),
            "review" => Ok(AgentKind::Review),
            "test" => Ok(AgentKind::Test),
            "docs" => Ok(AgentKind::Docs),
            "qa" => Ok(AgentKind::Qa),
            "init" => Ok(AgentKind::Init),
            other => Err(format!("unknown agent kind: {other}")),
        }
    }
}

/// How an agent kind's sandbox is materialised for a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SandboxKind {
    ReadOnly,
    WorkspaceWrite,
}

/// Static execution profile for one agent kind.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub kind: AgentKind,
    pub permissions: PermissionSet,
    /// Tool allowlist, in the order definitions are sent to the model.
    pub tools: &'static [&'static str],
    pub max_turns: usize,
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
    pub include_project_context: bool,
    /// Appended to the configured model id (e.g. `":online"`).
    pub model_suffix: Option<&'static str>,
}

impl AgentProfile {
    /// The built-in system prompt for this kind.
    pub fn system_prompt(&self) -> &'static str {
        crate::prompts::system_prompt(self.kind)
    }

    /// Materialise the sandbox profile for a workspace root.
    pub fn sandbox_for(&self, workspace: &Path) -> SandboxProfile {
        let base = match self.kind.sandbox_kind() {
            SandboxKind::ReadOnly => SandboxProfile::read_only(),
            SandboxKind::WorkspaceWrite => SandboxProfile::workspace_write(workspace),
        };
        if self.permissions.web {
            base.with_domains(vec!["*".to_string()])
        } else {
            base
        }
    }

    /// The model id this agent requests, given the configured default.
    pub fn model(&self, default_model: &str) -> String {
        match self.model_suffix {
            Some(suffix) => format!("{default_model}{suffix}"),
            None => default_model.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Permission;
    use std::str::FromStr;

    #[test]
    fn round_trip_all_kinds() {
        for kind in AgentKind::all() {
            assert_eq!(AgentKind::from_str(kind.as_str()).unwrap(), *kind);
        }
        assert!(AgentKind::from_str("wizard").is_err());
    }

    #[test]
    fn search_cannot_write() {
        let profile = AgentKind::Search.profile();
        assert!(profile.permissions.allows(Permission::Read));
        assert!(!profile.permissions.allows(Permission::Write));
        assert!(!profile.tools.contains(&"file_write"));
    }

    #[test]
    fn code_is_workspace_writable() {
        let profile = AgentKind::Code.profile();
        let sandbox = profile.sandbox_for(Path::new("/work"));
        assert!(sandbox.allows_write(Path::new("/work/src/lib.rs")));
        assert!(!sandbox.allows_write(Path::new("/etc/hosts")));
    }

    #[test]
    fn review_sandbox_is_read_only() {
        let profile = AgentKind::Review.profile();
        assert!(profile.sandbox_for(Path::new("/w")).is_read_only());
    }

    #[test]
    fn research_requests_online_model() {
        let profile = AgentKind::Research.profile();
        assert_eq!(profile.model("gpt-4o"), "gpt-4o:online");
        assert_eq!(AgentKind::Code.profile().model("gpt-4o"), "gpt-4o");
    }

    #[test]
    fn core_agents() {
        assert!(AgentKind::Search.is_core());
        assert!(AgentKind::Code.is_core());
        assert!(AgentKind::Test.is_core());
        assert!(!AgentKind::Docs.is_core());
    }

    #[test]
    fn timeouts_are_ordered() {
        for kind in AgentKind::all() {
            let p = kind.profile();
            assert!(p.default_timeout_secs <= p.max_timeout_secs, "{kind}");
        }
    }

    #[test]
    fn init_excludes_project_context() {
        assert!(!AgentKind::Init.profile().include_project_context);
        assert!(AgentKind::Code.profile().include_project_context);
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_string(&AgentKind::Qa).unwrap();
        assert_eq!(json, "\"qa\"");
    }
}
