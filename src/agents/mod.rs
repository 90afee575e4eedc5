//! Agent execution: kinds and profiles, the per-task executor loop, the
//! planner, the dependency-aware scheduler, and the quality gate.

pub mod context;
pub mod executor;
pub mod planner;
pub mod profiles;
pub mod prompt;
pub mod quality;
pub mod scheduler;

pub use context::DependencyContext;
pub use executor::{AgentExecutor, AgentResult, ExecutorConfig, SessionContext};
pub use planner::{Plan, PlanTask, Planner, PlannerOutcome};
pub use profiles::{AgentKind, AgentProfile};
pub use quality::{GateConfig, GateReport, QualityGate};
pub use scheduler::{ManagedTask, SchedulerConfig, TaskScheduler, TaskStatus};
