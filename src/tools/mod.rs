//! The tool surface: typed descriptors, the registry with per-agent
//! allowlists, the mediated invocation path, and the built-in tools.

pub mod executor;
pub mod fs_ops;
pub mod registry;
pub mod schema;
pub mod shell;
pub mod traits;
pub mod web;

pub use executor::{ToolExecutor, ToolOutcome};
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolContext, ToolInfo, ToolResult};

use std::sync::Arc;

use crate::agents::profiles::AgentKind;

/// Register the built-in tools and the per-agent allowlists from the static
/// agent profiles.
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(fs_ops::FileReadTool));
    registry.register(Arc::new(fs_ops::FileWriteTool));
    registry.register(Arc::new(fs_ops::FileListTool));
    registry.register(Arc::new(shell::ShellTool::new()));
    registry.register(Arc::new(web::WebFetchTool::new()));

    for kind in AgentKind::all() {
        let profile = kind.profile();
        registry.assign(kind.as_str(), profile.tools);
    }
    registry
}
