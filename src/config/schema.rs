//! TOML configuration schema.
//!
//! All fields have `#[serde(default)]` so a partially-filled `config.toml`
//! works correctly. Missing sections fall back to their `Default` impl.
//!
//! Example `~/.foreman/config.toml`:
//! ```toml
//! [provider]
//! base_url = "https://openrouter.ai/api/v1"
//! default_model = "gpt-4o-mini"
//!
//! [security]
//! permission_mode = "suggest"
//! sandbox_enabled = true
//!
//! [scheduler]
//! max_concurrency = 4
//!
//! [hooks]
//! pre_tool_use = ["./scripts/audit-tool.sh"]
//! ```

use serde::{Deserialize, Serialize};

use crate::security::PermissionMode;

// ─── ProviderConfig ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Default model identifier.
    pub default_model: String,
    /// Context window of the default model, in tokens.
    pub context_window: usize,
    /// Maximum retry attempts on transient errors.
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
            default_model: "gpt-4o-mini".to_owned(),
            context_window: 128_000,
            max_retries: 3,
        }
    }
}

// ─── SecurityConfig ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// How non-read tool calls are gated: `auto`, `suggest`, or `ask`.
    pub permission_mode: PermissionMode,
    /// Whether shell commands are wrapped in the host sandbox.
    pub sandbox_enabled: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            permission_mode: PermissionMode::default(),
            sandbox_enabled: true,
        }
    }
}

// ─── SchedulerConfig (file section) ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSection {
    /// Maximum agent tasks in flight at once.
    pub max_concurrency: usize,
    /// Optional wall-clock override (seconds) replacing every agent's
    /// maximum timeout.
    pub task_timeout_secs: Option<u64>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            task_timeout_secs: None,
        }
    }
}

// ─── HooksConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HooksConfig {
    /// Shell commands run before every tool call.
    pub pre_tool_use: Vec<String>,
    /// Shell commands run after every tool call.
    pub post_tool_use: Vec<String>,
    /// Shell commands run when a session ends.
    pub session_end: Vec<String>,
    /// Shell commands run before a session compaction.
    pub pre_compact: Vec<String>,
    /// Per-hook timeout in seconds.
    pub timeout_secs: u64,
    /// When true, a failing PreToolUse hook cancels the tool call.
    pub blocking: bool,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            pre_tool_use: Vec::new(),
            post_tool_use: Vec::new(),
            session_end: Vec::new(),
            pre_compact: Vec::new(),
            timeout_secs: 10,
            blocking: false,
        }
    }
}

// ─── RecorderConfig ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RecorderConfig {
    /// When set, every LLM exchange is appended to this NDJSON file.
    pub record_path: Option<String>,
}

// ─── Root ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ForemanConfig {
    pub provider: ProviderConfig,
    pub security: SecurityConfig,
    pub scheduler: SchedulerSection,
    pub hooks: HooksConfig,
    pub recorder: RecorderConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: ForemanConfig = toml::from_str("").unwrap();
        assert_eq!(config, ForemanConfig::default());
        assert_eq!(config.scheduler.max_concurrency, 4);
        assert!(config.security.sandbox_enabled);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: ForemanConfig = toml::from_str(
            r#"
            [provider]
            default_model = "local-model"

            [security]
            permission_mode = "auto"
            "#,
        )
        .unwrap();
        assert_eq!(config.provider.default_model, "local-model");
        assert_eq!(config.provider.context_window, 128_000);
        assert_eq!(config.security.permission_mode, PermissionMode::Auto);
        assert!(!config.hooks.blocking);
    }

    #[test]
    fn hooks_section_parses_lists() {
        let config: ForemanConfig = toml::from_str(
            r#"
            [hooks]
            pre_tool_use = ["echo pre"]
            blocking = true
            timeout_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.hooks.pre_tool_use, vec!["echo pre"]);
        assert!(config.hooks.blocking);
        assert_eq!(config.hooks.timeout_secs, 3);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ForemanConfig::default();
        let rendered = toml::to_string(&config).unwrap();
        let back: ForemanConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(config, back);
    }
}
