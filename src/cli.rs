//! Foreman CLI — headless interface to the agent runtime.
//!
//! Subcommands cover one-shot runs, plan preview, recorded-session replay,
//! and working-state inspection. Verbosity is controlled by `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use foreman::agents::PlannerOutcome;
use foreman::agents::planner::Planner;
use foreman::ai::openai::OpenAiCompatibleProvider;
use foreman::ai::provider::LlmProvider;
use foreman::ai::recorder::{RecordingProvider, ReplayProvider, SessionRecorder};
use foreman::ai::reliable::ReliableProvider;
use foreman::config::{ForemanConfig, load_config, load_default_config};
use foreman::event_bus::{EventBus, RuntimeEvent, TokioBroadcastBus};
use foreman::orchestrator::Orchestrator;
use foreman::security::{ApprovalHandler, AutoApprove, DenyAll};
use foreman::state::WorkingStateStore;
use foreman::trace::MetricsCollector;

#[derive(Parser, Debug)]
#[command(
    name = "foreman",
    about = "Multi-agent coding assistant runtime",
    version,
    long_about = "Headless interface to the foreman agent runtime.\n\
                  Plans user requests into specialist tasks and executes them\n\
                  with bounded concurrency and quality gates."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a config file (default: ~/.foreman/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Workspace root (default: current directory).
    #[arg(long, global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process one request end to end and print the reply.
    Run(RunArgs),
    /// Show the plan for a request without executing it.
    Plan(PlanArgs),
    /// Re-drive a request against a recorded session (no network).
    Replay(ReplayArgs),
    /// Inspect or clear the project working state.
    State(StateArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// The request to process.
    prompt: String,

    /// Approve all prompted tool calls without asking.
    #[arg(long)]
    auto: bool,

    /// Record every LLM exchange to this NDJSON file.
    #[arg(long, value_name = "PATH")]
    record: Option<PathBuf>,

    /// Print aggregated metrics after the run.
    #[arg(long)]
    metrics: bool,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    prompt: String,
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// Recording produced by `run --record`.
    recording: PathBuf,

    /// The request to re-drive.
    prompt: String,

    /// Fail on any drift between live and recorded requests.
    #[arg(long)]
    strict: bool,
}

#[derive(Parser, Debug)]
struct StateArgs {
    /// State action: show | clear.
    #[arg(default_value = "show")]
    action: String,
}

fn load_cli_config(path: Option<&PathBuf>) -> Result<ForemanConfig, String> {
    match path {
        Some(path) => load_config(path).map_err(|e| e.to_string()),
        None => load_default_config().map_err(|e| e.to_string()),
    }
}

fn live_provider(config: &ForemanConfig) -> Arc<dyn LlmProvider> {
    let api_key = std::env::var(&config.provider.api_key_env).unwrap_or_default();
    let http = OpenAiCompatibleProvider::new(api_key, config.provider.base_url.clone())
        .with_context_window(config.provider.context_window);
    Arc::new(ReliableProvider::new(Arc::new(http)))
}

async fn run_orchestrator(
    config: &ForemanConfig,
    provider: Arc<dyn LlmProvider>,
    workspace: PathBuf,
    approval: Arc<dyn ApprovalHandler>,
    prompt: &str,
    show_metrics: bool,
) -> Result<(), String> {
    let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());
    let metrics = show_metrics.then(|| MetricsCollector::attach(bus.as_ref()));

    // Progress line per agent event.
    let mut progress = bus.subscribe();
    let progress_task = tokio::spawn(async move {
        while let Ok(event) = progress.recv().await {
            match event {
                RuntimeEvent::AgentStart { agent, .. } => eprintln!("[{agent}] started"),
                RuntimeEvent::AgentComplete { agent, summary, .. } => {
                    eprintln!("[{agent}] done: {summary}");
                }
                RuntimeEvent::AgentError { agent, message, .. } => {
                    eprintln!("[{agent}] failed: {message}");
                }
                _ => {}
            }
        }
    });

    let mut orchestrator =
        Orchestrator::build(config, provider, workspace, approval, Some(bus.clone()));

    let reply = orchestrator
        .process_input(prompt)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", reply.text);

    orchestrator.end_session().await;
    progress_task.abort();

    if let Some(metrics) = metrics {
        let snapshot = metrics.snapshot();
        eprintln!("--- metrics ---");
        for (agent, m) in &snapshot.per_agent {
            eprintln!(
                "{agent}: runs={} failures={} tokens={}+{}",
                m.runs, m.failures, m.prompt_tokens, m.completion_tokens
            );
        }
    }
    Ok(())
}

async fn real_main() -> Result<(), String> {
    let cli = Cli::parse();
    let config = load_cli_config(cli.config.as_ref())?;
    let workspace = match cli.workspace.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|e| e.to_string())?,
    };

    match cli.command {
        Commands::Run(args) => {
            let approval: Arc<dyn ApprovalHandler> = if args.auto {
                Arc::new(AutoApprove)
            } else {
                Arc::new(DenyAll)
            };

            let provider = match &args.record {
                Some(path) => {
                    let recorder =
                        Arc::new(SessionRecorder::open(path).map_err(|e| e.to_string())?);
                    Arc::new(RecordingProvider::new(live_provider(&config), recorder))
                        as Arc<dyn LlmProvider>
                }
                None => live_provider(&config),
            };

            run_orchestrator(
                &config,
                provider,
                workspace,
                approval,
                &args.prompt,
                args.metrics,
            )
            .await
        }
        Commands::Plan(args) => {
            let planner = Planner::new(live_provider(&config), config.provider.default_model.clone());
            match planner.classify(&args.prompt, None).await {
                Ok(PlannerOutcome::Plan(plan)) => {
                    let json = serde_json::to_string_pretty(&plan).map_err(|e| e.to_string())?;
                    println!("{json}");
                    Ok(())
                }
                Ok(PlannerOutcome::DirectAnswer(text)) => {
                    println!("(direct answer)\n{text}");
                    Ok(())
                }
                Err(e) => Err(e.to_string()),
            }
        }
        Commands::Replay(args) => {
            let provider: Arc<dyn LlmProvider> = Arc::new(
                ReplayProvider::load(&args.recording, args.strict).map_err(|e| e.to_string())?,
            );
            run_orchestrator(
                &config,
                provider,
                workspace,
                Arc::new(AutoApprove),
                &args.prompt,
                false,
            )
            .await
        }
        Commands::State(args) => {
            let store = WorkingStateStore::for_project(&workspace);
            match args.action.as_str() {
                "show" => {
                    let state = store.load().map_err(|e| e.to_string())?;
                    let block = state.to_context_block();
                    if block.is_empty() {
                        println!("(no working state)");
                    } else {
                        println!("{block}");
                    }
                    Ok(())
                }
                "clear" => {
                    if store.path().exists() {
                        std::fs::remove_file(store.path()).map_err(|e| e.to_string())?;
                    }
                    store.invalidate();
                    println!("working state cleared");
                    Ok(())
                }
                other => Err(format!("unknown state action '{other}' (use show|clear)")),
            }
        }
    }
}

#[tokio::main]
async fn main() {
    foreman::logging::init();
    if let Err(e) = real_main().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
