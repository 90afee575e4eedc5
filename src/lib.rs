//! Foreman — a multi-agent coding assistant runtime.
//!
//! A user request is classified into either a direct answer or a plan: a
//! DAG of specialist tasks (search, code, review, test, …). The scheduler
//! releases ready tasks in parallel, each task runs a tool-calling executor
//! loop against an LLM provider under turn and token budgets, code-producing
//! results pass a review/QA quality gate, and every tool side effect is
//! mediated by a permission set and sandbox profile.

pub mod agents;
pub mod ai;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod hooks;
pub mod logging;
pub mod orchestrator;
pub mod prompts;
pub mod security;
pub mod state;
pub mod tools;
pub mod trace;

/// Convenience re-exports for the most commonly used types.
///
/// ```rust
/// use foreman::prelude::*;
/// ```
pub mod prelude {
    // AI provider trait and chat types
    pub use crate::ai::provider::LlmProvider;
    pub use crate::ai::types::{CompletionRequest, CompletionResponse, Message, MessageRole};

    // Agent execution
    pub use crate::agents::{
        AgentExecutor, AgentKind, AgentResult, Plan, PlanTask, Planner, PlannerOutcome,
        SessionContext, TaskScheduler, TaskStatus,
    };

    // Orchestration
    pub use crate::orchestrator::{Orchestrator, OrchestratorReply};

    // Tool system
    pub use crate::tools::{Tool, ToolContext, ToolRegistry, ToolResult};

    // Security
    pub use crate::security::{
        Permission, PermissionMediator, PermissionMode, PermissionSet, SandboxProfile,
    };

    // Event bus
    pub use crate::event_bus::{EventBus, RuntimeEvent, TokioBroadcastBus};

    // Configuration
    pub use crate::config::{ForemanConfig, load_default_config};

    // Working state
    pub use crate::state::{WorkingState, WorkingStateStore};
}
