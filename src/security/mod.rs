//! Permission mediation and sandboxing for tool side effects.

pub mod permissions;
pub mod sandbox;

pub use permissions::{
    ApprovalHandler, ApprovalRequest, AuditEntry, AutoApprove, Decision, DenyAll, Permission,
    PermissionMediator, PermissionMode, PermissionSet,
};
pub use sandbox::{FsProfile, HostPlatform, NetProfile, SandboxProfile, wrap_command};
