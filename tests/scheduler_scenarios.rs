//! End-to-end scheduler and quality-gate scenarios driven by a scripted
//! provider.

mod common;

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

use foreman::agents::executor::{AgentExecutor, ExecutorConfig, SessionContext};
use foreman::agents::planner::{Plan, PlanTask};
use foreman::agents::profiles::AgentKind;
use foreman::agents::quality::{GateConfig, QualityGate};
use foreman::agents::scheduler::{SchedulerConfig, TaskScheduler, TaskStatus};
use foreman::ai::types::MessageRole;
use foreman::hooks::HookRunner;
use foreman::security::{AutoApprove, PermissionMediator, PermissionMode};
use foreman::tools::{ToolExecutor, ToolRegistry, builtin_registry};

use common::*;

fn plan_task(agent: &str, description: &str, deps: Vec<usize>) -> PlanTask {
    PlanTask {
        agent: agent.to_string(),
        description: description.to_string(),
        depends_on: deps,
        toon_compact: false,
        exclude_from_summary: false,
    }
}

fn build_scheduler(
    provider: Arc<ScriptedProvider>,
    registry: ToolRegistry,
    workspace: &Path,
    config: SchedulerConfig,
) -> (Arc<TaskScheduler>, SessionContext) {
    let mediator = Arc::new(PermissionMediator::new(
        PermissionMode::Auto,
        Arc::new(AutoApprove),
    ));
    let tools = Arc::new(ToolExecutor::new(Arc::new(registry), mediator, None));
    let executor = Arc::new(AgentExecutor::new(
        provider,
        tools,
        Arc::new(HookRunner::disabled()),
        None,
        ExecutorConfig {
            default_model: "test-model".to_string(),
            ..ExecutorConfig::default()
        },
    ));
    let scheduler = Arc::new(TaskScheduler::new(executor, None, config));
    let mut session = SessionContext::new(workspace.to_path_buf());
    session.sandbox_enabled = false;
    (scheduler, session)
}

fn approved_review() -> String {
    json!({
        "filesReviewed": ["a.rs", "b.rs", "c.rs"],
        "issues": [],
        "overallScore": 9.0,
        "approved": true,
        "summary": "clean"
    })
    .to_string()
}

fn rejected_review() -> String {
    json!({
        "filesReviewed": ["a.rs"],
        "issues": [{
            "file": "a.rs",
            "line": 10,
            "severity": "major",
            "category": "correctness",
            "message": "bounds check missing"
        }],
        "overallScore": 4.0,
        "approved": false
    })
    .to_string()
}

fn passing_qa() -> String {
    json!({
        "checks": [{"name": "tests", "command": "cargo test", "passed": true, "output": "ok"}],
        "passed": true
    })
    .to_string()
}

// ─── Scenarios ─────────────────────────────────────────────────────────────

/// Plan: search → code touching three files; quality gate reviews, approves
/// first pass, and runs QA. Observed trajectory: search, code, review, qa.
#[tokio::test]
async fn search_then_code_with_quality_gate() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());

    provider.route(SEARCH_NEEDLE, vec![reply("relevant code is in src/lib.rs")]);
    provider.route(
        CODE_NEEDLE,
        vec![
            tool_reply(&[
                ("c1", "file_write", json!({"path": "a.rs", "content": "a"})),
                ("c2", "file_write", json!({"path": "b.rs", "content": "b"})),
                ("c3", "file_write", json!({"path": "c.rs", "content": "c"})),
            ]),
            reply("implemented the feature across three files"),
        ],
    );
    provider.route(REVIEW_NEEDLE, vec![reply(&approved_review())]);
    provider.route(QA_NEEDLE, vec![reply(&passing_qa())]);

    let (scheduler, session) = build_scheduler(
        provider.clone(),
        builtin_registry(),
        dir.path(),
        SchedulerConfig::default(),
    );

    let plan = Plan {
        plan: "Add a new feature".into(),
        tasks: vec![
            plan_task("search", "find the relevant code", vec![]),
            plan_task("code", "implement the feature", vec![0]),
        ],
    };
    let cancel = CancellationToken::new();
    let tasks = scheduler.execute_plan(&plan, &session, &cancel).await;

    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));

    // The code task saw the search result as dependency context.
    let code_call = provider
        .calls()
        .into_iter()
        .find(|r| r.messages[0].content.contains(CODE_NEEDLE))
        .unwrap();
    assert!(code_call.messages[1].content.contains("search_0_result"));
    assert!(code_call.messages[1].content.contains("src/lib.rs"));

    // Files really landed in the workspace.
    assert!(dir.path().join("a.rs").exists());
    let code_result = tasks[1].result.as_ref().unwrap();
    assert_eq!(code_result.files_created.len(), 3);

    // Quality gate: review approves, QA runs.
    let gate = QualityGate::new(scheduler.clone(), GateConfig::default());
    let report = gate
        .run(code_result, "Add a new feature", &session, &cancel)
        .await;
    assert!(report.triggered);
    assert_eq!(report.review_runs, 1);
    assert_eq!(report.fix_runs, 0);
    assert!(report.approved);
    assert!(report.qa.as_ref().unwrap().passed);

    // Trajectory: search before code before review before qa.
    let mut sequence = provider.call_sequence(&[
        SEARCH_NEEDLE,
        CODE_NEEDLE,
        REVIEW_NEEDLE,
        QA_NEEDLE,
    ]);
    sequence.dedup();
    assert_eq!(
        sequence,
        vec![SEARCH_NEEDLE, CODE_NEEDLE, REVIEW_NEEDLE, QA_NEEDLE]
    );
}

/// Review rejects once, the code agent fixes, review approves, QA runs.
/// Trajectory: review, code, review, qa — review invoked exactly twice.
#[tokio::test]
async fn auto_fix_loop_reruns_review() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());

    provider.route(
        REVIEW_NEEDLE,
        vec![reply(&rejected_review()), reply(&approved_review())],
    );
    provider.route(CODE_NEEDLE, vec![reply("applied the bounds check")]);
    provider.route(QA_NEEDLE, vec![reply(&passing_qa())]);

    let (scheduler, session) = build_scheduler(
        provider.clone(),
        builtin_registry(),
        dir.path(),
        SchedulerConfig::default(),
    );
    let gate = QualityGate::new(scheduler, GateConfig::default());

    // A fabricated code result with three changed files.
    let code_result = foreman::agents::AgentResult {
        task_id: uuid::Uuid::new_v4(),
        agent: AgentKind::Code,
        success: true,
        output: "changed".into(),
        summary: "changed".into(),
        files_modified: vec!["a.rs".into(), "b.rs".into(), "c.rs".into()],
        files_created: vec![],
        prompt_tokens: 0,
        completion_tokens: 0,
    };

    let cancel = CancellationToken::new();
    let report = gate
        .run(&code_result, "harden the parser", &session, &cancel)
        .await;

    assert!(report.triggered);
    assert_eq!(report.review_runs, 2);
    assert_eq!(report.fix_runs, 1);
    assert!(report.approved);
    assert_eq!(provider.call_count(REVIEW_NEEDLE), 2);
    assert_eq!(provider.call_count(QA_NEEDLE), 1);

    // The fix prompt enumerated the review issue.
    let fix_call = provider
        .calls()
        .into_iter()
        .find(|r| r.messages[0].content.contains(CODE_NEEDLE))
        .unwrap();
    assert!(fix_call.messages[1].content.contains("bounds check missing"));
}

/// A hung search task times out, is classified as abort, and earns exactly
/// one retry with a doubled timeout; the retry succeeds.
#[tokio::test(start_paused = true)]
async fn timeout_retry_runs_task_twice() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());

    provider.route(
        SEARCH_NEEDLE,
        vec![Step::Hang, reply("found it on the second attempt")],
    );

    let (scheduler, session) = build_scheduler(
        provider.clone(),
        builtin_registry(),
        dir.path(),
        SchedulerConfig {
            max_concurrency: 2,
            task_timeout_secs: Some(1),
        },
    );

    let plan = Plan {
        plan: "search something".into(),
        tasks: vec![plan_task("search", "find the thing", vec![])],
    };
    let cancel = CancellationToken::new();
    let tasks = scheduler.execute_plan(&plan, &session, &cancel).await;

    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert_eq!(tasks[0].retries, 1);
    let result = tasks[0].result.as_ref().unwrap();
    assert!(result.success);
    assert!(result.summary.contains("second attempt"));
    assert_eq!(provider.call_count(SEARCH_NEEDLE), 2);
}

/// A retry is spent once: a task that hangs on both attempts ends failed.
#[tokio::test(start_paused = true)]
async fn retry_bound_is_one() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    provider.route(SEARCH_NEEDLE, vec![Step::Hang, Step::Hang, Step::Hang]);

    let (scheduler, session) = build_scheduler(
        provider.clone(),
        builtin_registry(),
        dir.path(),
        SchedulerConfig {
            max_concurrency: 2,
            task_timeout_secs: Some(1),
        },
    );

    let plan = Plan {
        plan: "search".into(),
        tasks: vec![plan_task("search", "find", vec![])],
    };
    let cancel = CancellationToken::new();
    let tasks = scheduler.execute_plan(&plan, &session, &cancel).await;

    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(tasks[0].retries, 1);
    // Initial run + one retry, never a third dispatch.
    assert_eq!(provider.call_count(SEARCH_NEEDLE), 2);
}

/// A search agent requesting file_write is denied by the permission
/// mediator; the loop continues, the agent still completes, and nothing is
/// written.
#[tokio::test]
async fn permission_denial_is_survivable() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());

    provider.route(
        SEARCH_NEEDLE,
        vec![
            tool_reply(&[(
                "c1",
                "file_write",
                json!({"path": "notes.txt", "content": "scratch"}),
            )]),
            reply("write was denied; reporting findings from reads only"),
        ],
    );

    // file_write is visible to the search agent here so the denial comes
    // from its permission set, not the allowlist.
    let mut registry = builtin_registry();
    registry.append("search", &["file_write"]);

    let (scheduler, session) = build_scheduler(
        provider.clone(),
        registry,
        dir.path(),
        SchedulerConfig::default(),
    );

    let plan = Plan {
        plan: "investigate".into(),
        tasks: vec![plan_task("search", "look around", vec![])],
    };
    let cancel = CancellationToken::new();
    let tasks = scheduler.execute_plan(&plan, &session, &cancel).await;

    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert!(!dir.path().join("notes.txt").exists());

    // The denial reached the model as an ERROR tool message.
    let second_call = provider
        .calls()
        .into_iter()
        .filter(|r| r.messages[0].content.contains(SEARCH_NEEDLE))
        .nth(1)
        .unwrap();
    let tool_message = second_call
        .messages
        .iter()
        .find(|m| m.role == MessageRole::Tool)
        .unwrap();
    assert!(tool_message.content.starts_with("ERROR: permission denied"));
}

/// Two independent searches run in the same scheduler batch; the dependent
/// code task runs only after both complete and sees both results.
#[tokio::test]
async fn parallel_fan_in() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());

    // Both searches must be in flight simultaneously to pass the barrier; a
    // serialised dispatch would deadlock and fail the test by timeout.
    let barrier = Arc::new(Barrier::new(2));
    provider.route(
        SEARCH_NEEDLE,
        vec![
            Step::BarrierThenReply(barrier.clone(), text_response("alpha result")),
            Step::BarrierThenReply(barrier, text_response("beta result")),
        ],
    );
    provider.route(CODE_NEEDLE, vec![reply("combined both findings")]);

    let (scheduler, session) = build_scheduler(
        provider.clone(),
        builtin_registry(),
        dir.path(),
        SchedulerConfig::default(),
    );

    let plan = Plan {
        plan: "fan in".into(),
        tasks: vec![
            plan_task("search", "search A", vec![]),
            plan_task("search", "search B", vec![]),
            plan_task("code", "combine results", vec![0, 1]),
        ],
    };
    let cancel = CancellationToken::new();
    let tasks = scheduler.execute_plan(&plan, &session, &cancel).await;

    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));

    let code_call = provider
        .calls()
        .into_iter()
        .find(|r| r.messages[0].content.contains(CODE_NEEDLE))
        .unwrap();
    let user = &code_call.messages[1].content;
    assert!(user.contains("search_0_result"));
    assert!(user.contains("search_1_result"));
}

/// A failed prerequisite makes its dependents unreachable; they are
/// reported failed without ever being dispatched.
#[tokio::test]
async fn failed_dependency_blocks_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());

    // An empty route makes the provider error permanently (the message is
    // not abort-classified, so no retry applies).
    provider.route(SEARCH_NEEDLE, vec![]);

    let (scheduler, session) = build_scheduler(
        provider.clone(),
        builtin_registry(),
        dir.path(),
        SchedulerConfig::default(),
    );

    let plan = Plan {
        plan: "doomed".into(),
        tasks: vec![
            plan_task("search", "will fail", vec![]),
            plan_task("code", "never runs", vec![0]),
        ],
    };
    let cancel = CancellationToken::new();
    let tasks = scheduler.execute_plan(&plan, &session, &cancel).await;

    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(tasks[1].status, TaskStatus::Failed);
    assert!(
        tasks[1]
            .result
            .as_ref()
            .unwrap()
            .output
            .contains("unreachable")
    );
    assert_eq!(provider.call_count(CODE_NEEDLE), 0);
}

/// An unknown agent kind in a plan becomes a failed task, not a panic.
#[tokio::test]
async fn unknown_agent_kind_fails_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());

    let (scheduler, session) = build_scheduler(
        provider,
        builtin_registry(),
        dir.path(),
        SchedulerConfig::default(),
    );

    let plan = Plan {
        plan: "bad plan".into(),
        tasks: vec![plan_task("wizard", "cast a spell", vec![])],
    };
    let cancel = CancellationToken::new();
    let tasks = scheduler.execute_plan(&plan, &session, &cancel).await;

    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert!(
        tasks[0]
            .result
            .as_ref()
            .unwrap()
            .output
            .contains("unknown agent kind")
    );
}

/// Cancellation observed mid-plan cancels in-flight tasks and exits.
#[tokio::test]
async fn cancellation_aborts_in_flight_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    provider.route(SEARCH_NEEDLE, vec![Step::Hang]);

    let (scheduler, session) = build_scheduler(
        provider,
        builtin_registry(),
        dir.path(),
        SchedulerConfig::default(),
    );

    let plan = Plan {
        plan: "cancelled".into(),
        tasks: vec![plan_task("search", "never finishes", vec![])],
    };
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let tasks = scheduler.execute_plan(&plan, &session, &cancel).await;
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert!(tasks[0].result.as_ref().unwrap().output.contains("abort"));
}
