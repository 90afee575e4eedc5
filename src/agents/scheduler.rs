//! Dependency-aware task scheduler.
//!
//! Executes a plan's tasks respecting their DAG: each iteration releases
//! every pending task whose prerequisites are all completed and runs the
//! batch concurrently (bounded by a semaphore). A failure does not fail the
//! plan; dependents of a failed task become unreachable and are reported as
//! failed. Tasks whose failure looks like an abort or timeout get exactly
//! one retry with a doubled timeout, capped at three times the agent's hard
//! maximum.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agents::context::DependencyContext;
use crate::agents::executor::{AgentExecutor, AgentResult, SessionContext};
use crate::agents::planner::Plan;
use crate::agents::profiles::AgentKind;
use crate::error::is_abort;
use crate::event_bus::{EventBus, RuntimeEvent};

// ─── Managed tasks ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A plan task with mutable execution state.
#[derive(Debug, Clone)]
pub struct ManagedTask {
    pub id: Uuid,
    pub index: usize,
    /// Raw agent kind string from the plan; resolved at dispatch time so an
    /// unknown kind becomes a failed task, not a crash.
    pub agent: String,
    pub description: String,
    pub depends_on: Vec<usize>,
    pub compact_context: bool,
    pub exclude_from_summary: bool,
    pub status: TaskStatus,
    pub result: Option<AgentResult>,
    pub retries: u8,
    pub timeout_override: Option<Duration>,
}

impl ManagedTask {
    fn from_plan(plan: &Plan) -> Vec<ManagedTask> {
        plan.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| ManagedTask {
                id: Uuid::new_v4(),
                index,
                agent: task.agent.clone(),
                description: task.description.clone(),
                depends_on: task.depends_on.clone(),
                compact_context: task.toon_compact,
                exclude_from_summary: task.exclude_from_summary,
                status: TaskStatus::Pending,
                result: None,
                retries: 0,
                timeout_override: None,
            })
            .collect()
    }
}

// ─── Scheduler ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum tasks in flight at once.
    pub max_concurrency: usize,
    /// Overrides every agent's maximum timeout when set (seconds). Retry
    /// doubling and the 3x ceiling apply to this base instead.
    pub task_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            task_timeout_secs: None,
        }
    }
}

pub struct TaskScheduler {
    executor: Arc<AgentExecutor>,
    bus: Option<Arc<dyn EventBus>>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    pub fn new(
        executor: Arc<AgentExecutor>,
        bus: Option<Arc<dyn EventBus>>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            executor,
            bus,
            config,
        }
    }

    /// Execute a plan to quiescence: every task ends `Completed` or `Failed`.
    #[tracing::instrument(name = "scheduler.execute_plan", skip_all, fields(tasks = plan.tasks.len()))]
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        session: &SessionContext,
        cancel: &CancellationToken,
    ) -> Vec<ManagedTask> {
        let mut tasks = ManagedTask::from_plan(plan);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let ready: Vec<usize> = tasks
                .iter()
                .filter(|t| {
                    t.status == TaskStatus::Pending
                        && t.depends_on
                            .iter()
                            .all(|&d| tasks[d].status == TaskStatus::Completed)
                })
                .map(|t| t.index)
                .collect();

            if ready.is_empty() {
                // A timed-out task may earn one retry before we give up.
                if self.recover_timeouts(&mut tasks) {
                    continue;
                }
                break;
            }

            self.run_batch(&mut tasks, &ready, session, cancel).await;

            if cancel.is_cancelled() {
                break;
            }
        }

        // Whatever never became ready is blocked behind a failure (or the
        // run was cancelled).
        for task in &mut tasks {
            if task.status == TaskStatus::Pending || task.status == TaskStatus::InProgress {
                let kind = AgentKind::from_str(&task.agent).unwrap_or(AgentKind::Code);
                let reason = if cancel.is_cancelled() {
                    "aborted: plan execution cancelled"
                } else {
                    "unreachable: a prerequisite task failed"
                };
                task.status = TaskStatus::Failed;
                task.result = Some(AgentResult::failure(task.id, kind, reason));
            }
        }

        tasks
    }

    /// Dispatch one batch of ready tasks concurrently and collect results.
    async fn run_batch(
        &self,
        tasks: &mut [ManagedTask],
        ready: &[usize],
        session: &SessionContext,
        cancel: &CancellationToken,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut join_set: JoinSet<(usize, AgentResult)> = JoinSet::new();

        for &index in ready {
            tasks[index].status = TaskStatus::InProgress;

            let kind = match AgentKind::from_str(&tasks[index].agent) {
                Ok(kind) => kind,
                Err(message) => {
                    // Lost invariant: the plan referenced a kind we do not
                    // have. Becomes a failed task, never a panic.
                    let result =
                        AgentResult::failure(tasks[index].id, AgentKind::Code, message);
                    self.emit_result(&tasks[index], &result);
                    tasks[index].status = TaskStatus::Failed;
                    tasks[index].result = Some(result);
                    continue;
                }
            };

            let description = self.describe_with_context(tasks, index);
            let timeout = self.effective_timeout(&tasks[index], kind);
            let task_id = tasks[index].id;

            self.emit(RuntimeEvent::AgentStart {
                task_id: task_id.to_string(),
                agent: kind.as_str().to_string(),
                description: tasks[index].description.clone(),
            });

            let executor = self.executor.clone();
            let session = session.clone();
            let child_cancel = cancel.child_token();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let run = executor.run_task(kind, task_id, &description, &session, child_cancel.clone());
                let result = match tokio::time::timeout(timeout, run).await {
                    Ok(result) => result,
                    Err(_) => {
                        child_cancel.cancel();
                        AgentResult::failure(
                            task_id,
                            kind,
                            format!("timed out after {}s", timeout.as_secs()),
                        )
                    }
                };
                (index, result)
            });
        }

        loop {
            let joined = tokio::select! {
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    break;
                }
                j = join_set.join_next() => j,
            };
            let Some(joined) = joined else { break };

            match joined {
                Ok((index, result)) => {
                    self.emit_result(&tasks[index], &result);
                    tasks[index].status = if result.success {
                        TaskStatus::Completed
                    } else {
                        TaskStatus::Failed
                    };
                    tasks[index].result = Some(result);
                }
                Err(e) => {
                    // A panicked task leaves its slot InProgress; swept below.
                    log::error!("task join failed: {e}");
                }
            }
        }

        for task in tasks.iter_mut() {
            if task.status == TaskStatus::InProgress {
                let kind = AgentKind::from_str(&task.agent).unwrap_or(AgentKind::Code);
                let message = if cancel.is_cancelled() {
                    "aborted: plan execution cancelled"
                } else {
                    "task execution panicked"
                };
                let result = AgentResult::failure(task.id, kind, message);
                self.emit_result(task, &result);
                task.status = TaskStatus::Failed;
                task.result = Some(result);
            }
        }
    }

    /// One retry for abort-classified failures: bump the retry count, double
    /// the timeout (capped at 3x the hard maximum), and revert to pending.
    fn recover_timeouts(&self, tasks: &mut [ManagedTask]) -> bool {
        let mut recovered = false;
        for index in 0..tasks.len() {
            if tasks[index].status != TaskStatus::Failed || tasks[index].retries > 0 {
                continue;
            }
            let aborted = tasks[index]
                .result
                .as_ref()
                .is_some_and(|r| is_abort(&r.output));
            if !aborted {
                continue;
            }
            // Dependencies must still be satisfiable for a retry to help.
            let deps_ok = tasks[index]
                .depends_on
                .iter()
                .all(|&d| tasks[d].status == TaskStatus::Completed);
            if !deps_ok {
                continue;
            }

            let Ok(kind) = AgentKind::from_str(&tasks[index].agent) else {
                continue;
            };
            // Doubled here; effective_timeout clamps to the 3x ceiling.
            let base = self.base_timeout(kind);
            let doubled = base * 2;

            log::info!(
                "retrying task {} ({}) with {}s timeout",
                tasks[index].index,
                tasks[index].agent,
                doubled.as_secs()
            );
            tasks[index].retries = 1;
            tasks[index].timeout_override = Some(doubled);
            tasks[index].status = TaskStatus::Pending;
            tasks[index].result = None;
            recovered = true;
        }
        recovered
    }

    /// Run one ad-hoc task through the scheduler's execution path (used by
    /// the quality gate). Shares timeout and cancellation semantics with
    /// planned tasks.
    pub async fn run_single(
        &self,
        kind: AgentKind,
        description: &str,
        session: &SessionContext,
        cancel: &CancellationToken,
    ) -> AgentResult {
        let task_id = Uuid::new_v4();
        let timeout = self.base_timeout(kind);

        self.emit(RuntimeEvent::AgentStart {
            task_id: task_id.to_string(),
            agent: kind.as_str().to_string(),
            description: description.to_string(),
        });

        let child_cancel = cancel.child_token();
        let run = self
            .executor
            .run_task(kind, task_id, description, session, child_cancel.clone());
        let result = match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                child_cancel.cancel();
                AgentResult::failure(
                    task_id,
                    kind,
                    format!("timed out after {}s", timeout.as_secs()),
                )
            }
        };

        self.emit(RuntimeEvent::AgentComplete {
            task_id: task_id.to_string(),
            agent: kind.as_str().to_string(),
            success: result.success,
            summary: result.summary.clone(),
        });
        result
    }

    // ── Internal ─────────────────────────────────────────────────────────

    fn describe_with_context(&self, tasks: &[ManagedTask], index: usize) -> String {
        let task = &tasks[index];
        let mut context = DependencyContext::new();
        for &dep in &task.depends_on {
            if let Some(result) = &tasks[dep].result {
                context.insert(
                    &tasks[dep].agent,
                    dep,
                    serde_json::Value::String(result.output.clone()),
                );
            }
        }
        if context.is_empty() {
            return task.description.clone();
        }
        format!(
            "{}\n\nContext from prerequisite tasks:\n{}",
            task.description,
            context.render(task.compact_context)
        )
    }

    fn base_timeout(&self, kind: AgentKind) -> Duration {
        let secs = self
            .config
            .task_timeout_secs
            .unwrap_or(kind.profile().max_timeout_secs);
        Duration::from_secs(secs)
    }

    fn effective_timeout(&self, task: &ManagedTask, kind: AgentKind) -> Duration {
        let base = self.base_timeout(kind);
        match task.timeout_override {
            Some(requested) => requested.min(base * 3),
            None => base,
        }
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(bus) = &self.bus {
            let _ = bus.publish(event);
        }
    }

    fn emit_result(&self, task: &ManagedTask, result: &AgentResult) {
        if result.success {
            self.emit(RuntimeEvent::AgentComplete {
                task_id: task.id.to_string(),
                agent: result.agent.as_str().to_string(),
                success: true,
                summary: result.summary.clone(),
            });
        } else {
            self.emit(RuntimeEvent::AgentError {
                task_id: task.id.to_string(),
                agent: result.agent.as_str().to_string(),
                message: result.summary.clone(),
            });
        }
    }
}
