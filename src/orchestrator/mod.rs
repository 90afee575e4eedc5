//! The session orchestrator.
//!
//! Owns the conversation history, the pending plan, and the working-state
//! handle, and drives each user turn through planner → scheduler → quality
//! gate → synthesis. The conversation is mutated only here, never from
//! inside an executor loop.

pub mod compactor;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agents::executor::{AgentExecutor, ExecutorConfig, SessionContext};
use crate::agents::planner::{Plan, Planner, PlannerOutcome};
use crate::agents::profiles::AgentKind;
use crate::agents::quality::{GateConfig, GateReport, QualityGate};
use crate::agents::scheduler::{ManagedTask, SchedulerConfig, TaskScheduler, TaskStatus};
use crate::ai::provider::LlmProvider;
use crate::ai::types::Message;
use crate::config::ForemanConfig;
use crate::error::Result;
use crate::event_bus::{EventBus, RuntimeEvent};
use crate::hooks::{HookPoint, HookRunner};
use crate::security::{ApprovalHandler, PermissionMediator};
use crate::state::{OpenTaskStatus, WorkingStateStore};
use crate::tools::{ToolExecutor, builtin_registry};
use crate::trace::{SpanKind, Trace, Tracer};

use compactor::{CompactionConfig, compact_session};

/// Everything a completed turn hands back to the caller.
#[derive(Debug)]
pub struct OrchestratorReply {
    /// The synthesized reply text.
    pub text: String,
    /// The executed plan, when the turn was planned rather than direct.
    pub plan: Option<Plan>,
    /// Per-task execution state for a planned turn.
    pub tasks: Vec<ManagedTask>,
    /// Quality-gate outcomes for code results.
    pub gates: Vec<GateReport>,
    /// Visible warnings (core-agent failures, unapproved reviews).
    pub warnings: Vec<String>,
}

impl OrchestratorReply {
    fn direct(text: String) -> Self {
        Self {
            text,
            plan: None,
            tasks: Vec::new(),
            gates: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Execute plans immediately instead of parking them for confirmation.
    pub auto_execute_plans: bool,
    pub compaction: CompactionConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto_execute_plans: true,
            compaction: CompactionConfig::default(),
        }
    }
}

pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    planner: Planner,
    scheduler: Arc<TaskScheduler>,
    gate: QualityGate,
    state_store: Arc<WorkingStateStore>,
    hooks: Arc<HookRunner>,
    bus: Option<Arc<dyn EventBus>>,
    tracer: Arc<Tracer>,
    session_id: String,
    session: SessionContext,
    config: OrchestratorConfig,
    default_model: String,
    cancel: CancellationToken,
    conversation: Vec<Message>,
    pending_plan: Option<Plan>,
}

impl Orchestrator {
    /// Wire the full object graph from a configuration record, a provider,
    /// and a workspace root. The bus is optional; pass one to observe
    /// progress events.
    pub fn build(
        config: &ForemanConfig,
        provider: Arc<dyn LlmProvider>,
        workspace_root: PathBuf,
        approval: Arc<dyn ApprovalHandler>,
        bus: Option<Arc<dyn EventBus>>,
    ) -> Self {
        let mediator = Arc::new(PermissionMediator::new(
            config.security.permission_mode,
            approval,
        ));
        let registry = Arc::new(builtin_registry());
        let tools = Arc::new(ToolExecutor::new(registry, mediator, bus.clone()));

        let mut hook_runner = HookRunner::new(
            std::time::Duration::from_secs(config.hooks.timeout_secs),
            config.hooks.blocking,
        );
        for (point, commands) in [
            (HookPoint::PreToolUse, &config.hooks.pre_tool_use),
            (HookPoint::PostToolUse, &config.hooks.post_tool_use),
            (HookPoint::SessionEnd, &config.hooks.session_end),
            (HookPoint::PreCompact, &config.hooks.pre_compact),
        ] {
            for command in commands {
                hook_runner.register(point, command.clone());
            }
        }
        let hooks = Arc::new(hook_runner);

        let executor = Arc::new(AgentExecutor::new(
            provider.clone(),
            tools,
            hooks.clone(),
            bus.clone(),
            ExecutorConfig {
                default_model: config.provider.default_model.clone(),
                ..ExecutorConfig::default()
            },
        ));
        let scheduler = Arc::new(TaskScheduler::new(
            executor,
            bus.clone(),
            SchedulerConfig {
                max_concurrency: config.scheduler.max_concurrency,
                task_timeout_secs: config.scheduler.task_timeout_secs,
            },
        ));
        let gate = QualityGate::new(scheduler.clone(), GateConfig::default());
        let planner = Planner::new(provider.clone(), config.provider.default_model.clone());
        let planner = match &bus {
            Some(bus) => planner.with_bus(bus.clone()),
            None => planner,
        };

        let session_id = Uuid::new_v4().to_string();
        let mut session = SessionContext::new(workspace_root.clone());
        session.sandbox_enabled = config.security.sandbox_enabled;

        Self {
            provider,
            planner,
            scheduler,
            gate,
            state_store: Arc::new(WorkingStateStore::for_project(&workspace_root)),
            hooks,
            bus,
            tracer: Arc::new(Tracer::new(session_id.clone())),
            session_id,
            session,
            config: OrchestratorConfig::default(),
            default_model: config.provider.default_model.clone(),
            cancel: CancellationToken::new(),
            conversation: Vec::new(),
            pending_plan: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject a compact project description into agent prompts.
    pub fn set_project_context(&mut self, context: impl Into<String>) {
        self.session.project_context = Some(context.into());
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Token for cancelling the in-flight turn from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    /// Seed the conversation history (session restore and tests).
    pub fn preload_conversation(&mut self, messages: Vec<Message>) {
        self.conversation = messages;
    }

    pub fn pending_plan(&self) -> Option<&Plan> {
        self.pending_plan.as_ref()
    }

    /// Process one user turn end to end.
    #[tracing::instrument(name = "orchestrator.turn", skip_all, fields(session = %self.session_id))]
    pub async fn process_input(&mut self, input: &str) -> Result<OrchestratorReply> {
        let turn_span = self.tracer.start_span(SpanKind::Orchestrator, "turn");

        self.maybe_compact().await;
        self.refresh_state_block();
        self.conversation.push(Message::user(input));

        let outcome = self
            .planner
            .classify(input, self.session.project_context.as_deref())
            .await;

        let reply = match outcome {
            Err(e) => {
                // Planner failures end the turn with a readable reply, not a
                // crashed session.
                let text = format!("Planning failed: {e}");
                self.conversation.push(Message::assistant(text.clone()));
                OrchestratorReply::direct(text)
            }
            Ok(PlannerOutcome::DirectAnswer(text)) => {
                self.conversation.push(Message::assistant(text.clone()));
                OrchestratorReply::direct(text)
            }
            Ok(PlannerOutcome::Plan(plan)) => {
                if self.config.auto_execute_plans {
                    self.execute_plan(plan, input).await
                } else {
                    let text = format!(
                        "Proposed plan: {} ({} task(s)). Confirm to execute.",
                        plan.plan,
                        plan.tasks.len()
                    );
                    self.pending_plan = Some(plan);
                    OrchestratorReply::direct(text)
                }
            }
        };

        self.tracer.end_span(turn_span);
        Ok(reply)
    }

    /// Execute a plan previously parked by `process_input`.
    pub async fn confirm_pending(&mut self, user_input: &str) -> Option<OrchestratorReply> {
        let plan = self.pending_plan.take()?;
        Some(self.execute_plan(plan, user_input).await)
    }

    /// Discard a parked plan.
    pub fn reject_pending(&mut self) -> bool {
        self.pending_plan.take().is_some()
    }

    async fn execute_plan(&mut self, plan: Plan, user_input: &str) -> OrchestratorReply {
        self.note_plan_started(&plan);

        let span = self.tracer.start_span(SpanKind::Agent, "plan");
        let tasks = self
            .scheduler
            .execute_plan(&plan, &self.session, &self.cancel)
            .await;
        self.tracer.end_span(span);

        let mut gates = Vec::new();
        for task in &tasks {
            let Some(result) = &task.result else { continue };
            if result.success && result.agent == AgentKind::Code && !result.changed_files().is_empty()
            {
                let report = self
                    .gate
                    .run(result, user_input, &self.session, &self.cancel)
                    .await;
                if report.triggered {
                    gates.push(report);
                }
            }
        }

        let (text, warnings) = synthesize(&plan, &tasks, &gates);
        self.conversation.push(Message::assistant(text.clone()));
        self.note_plan_finished(&tasks);

        OrchestratorReply {
            text,
            plan: Some(plan),
            tasks,
            gates,
            warnings,
        }
    }

    /// Fire the SessionEnd hook and return the finished trace.
    pub async fn end_session(&mut self) -> Option<Trace> {
        self.hooks
            .run(
                HookPoint::SessionEnd,
                &[("SESSION_ID", self.session_id.clone())],
            )
            .await;
        self.tracer.finish()
    }

    // ── Internal ─────────────────────────────────────────────────────────

    async fn maybe_compact(&mut self) {
        let before = self.conversation.len();
        let needs_tokens = crate::ai::types::estimate_conversation_tokens(&self.conversation)
            > self.provider.context_window() * self.config.compaction.threshold_percent / 100;
        let needs_length = before > self.config.compaction.max_messages;
        if !needs_tokens && !needs_length {
            return;
        }

        self.hooks.run(HookPoint::PreCompact, &[]).await;
        if let Some(dropped) = compact_session(
            &self.provider,
            &self.default_model,
            &mut self.conversation,
            &self.config.compaction,
        )
        .await
        {
            log::info!("session compacted: dropped {dropped} message(s)");
            if let Some(bus) = &self.bus {
                let _ = bus.publish(RuntimeEvent::SessionCompacted {
                    dropped_messages: dropped,
                });
            }
        }
    }

    fn refresh_state_block(&mut self) {
        self.session.state_block = self
            .state_store
            .load()
            .ok()
            .map(|state| state.to_context_block())
            .filter(|block| !block.is_empty());
    }

    fn note_plan_started(&self, plan: &Plan) {
        let Ok(mut state) = self.state_store.load() else { return };
        state.goal = plan.plan.clone();
        state.now = format!("executing plan ({} tasks)", plan.tasks.len());
        for task in &plan.tasks {
            state.upsert_task(&task.description, OpenTaskStatus::InProgress);
        }
        if let Err(e) = self.state_store.save(state) {
            log::warn!("failed to persist working state: {e}");
        }
    }

    fn note_plan_finished(&self, tasks: &[ManagedTask]) {
        let Ok(mut state) = self.state_store.load() else { return };
        state.now = "idle".to_string();
        for task in tasks {
            let status = match task.status {
                TaskStatus::Completed => OpenTaskStatus::Done,
                _ => OpenTaskStatus::Open,
            };
            state.upsert_task(&task.description, status);
        }
        if let Err(e) = self.state_store.save(state) {
            log::warn!("failed to persist working state: {e}");
        }
    }
}

/// Build the final reply: one line per task (unless excluded), failures
/// enumerated, with a visible warning when a core agent failed.
fn synthesize(
    plan: &Plan,
    tasks: &[ManagedTask],
    gates: &[GateReport],
) -> (String, Vec<String>) {
    let mut lines = vec![format!("{}\n", plan.plan)];
    let mut warnings = Vec::new();
    let mut failed_core: Vec<&str> = Vec::new();

    for task in tasks {
        let Some(result) = &task.result else { continue };
        if result.success && task.exclude_from_summary {
            continue;
        }
        if result.success {
            lines.push(format!("- [{}] {}", task.agent, result.summary));
        } else {
            lines.push(format!("- [{}] FAILED: {}", task.agent, result.summary));
            if result.agent.is_core() && !failed_core.contains(&result.agent.as_str()) {
                failed_core.push(result.agent.as_str());
            }
        }
    }

    if !failed_core.is_empty() {
        warnings.push(format!(
            "Warning: core agent task(s) failed: {}",
            failed_core.join(", ")
        ));
    }
    for gate in gates {
        warnings.extend(gate.warnings.iter().cloned());
        if gate.approved && gate.qa.as_ref().is_some_and(|qa| qa.passed) {
            lines.push("- quality gate passed".to_string());
        }
    }

    let mut text = lines.join("\n");
    if !warnings.is_empty() {
        text.push_str("\n\n");
        text.push_str(&warnings.join("\n"));
    }
    (text, warnings)
}
