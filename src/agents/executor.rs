//! The per-task agent executor loop.
//!
//! # Algorithm
//!
//! ```text
//! assemble prompt (priority sections, token cap)
//!       │
//!       ▼
//! LLM.complete(messages + permitted tool definitions)
//!       │
//!       ├─ finish=length ──► append continuation nudge, iterate
//!       ├─ finish=stop or no tool calls ──► success
//!       ▼ tool calls present
//! for each call:
//!   parse args (malformed → {})
//!   PreToolUse hook ──► ToolExecutor (permissions, sandbox) ──► PostToolUse hook
//!   append tool message (output truncated, failures as "ERROR: …")
//!       │
//!       ▼
//! trim history at 60% of the context window (keep system+user head, recent tail)
//! turn += 1; if turn < max_turns → repeat, else fail with "max turns reached"
//! ```
//!
//! Cancellation fires between turns and races the in-flight LLM call; the
//! loop exits with an aborted result the scheduler classifies as
//! retry-eligible.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ai::provider::LlmProvider;
use crate::ai::types::{
    CompletionRequest, Message, MessageRole, estimate_conversation_tokens,
};
use crate::agents::profiles::{AgentKind, AgentProfile};
use crate::agents::prompt::PromptBuilder;
use crate::event_bus::{EventBus, RuntimeEvent};
use crate::hooks::{HookPoint, HookRunner};
use crate::prompts::CONTINUATION_NUDGE;
use crate::tools::{ToolContext, ToolExecutor};

/// Character cap on a single tool output fed back to the model.
const MAX_TOOL_OUTPUT_CHARS: usize = 8_000;
/// Lines preserved at the head/tail of a truncated tool output.
const TRUNCATE_HEAD_LINES: usize = 50;
const TRUNCATE_TAIL_LINES: usize = 20;
/// Character cap on an `ERROR: …` tool message.
const MAX_ERROR_CHARS: usize = 500;
/// Messages kept at the end of the history by a runner-level trim.
const TRIM_KEEP_TAIL: usize = 6;
/// Fraction of the context window that triggers a runner-level trim.
const TRIM_THRESHOLD_PERCENT: usize = 60;

/// Marker inserted where trimmed messages used to be.
const TRIM_MARKER: &str = "[previous conversation truncated]";

// ─── Results ───────────────────────────────────────────────────────────────

/// Terminal result of one agent task.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentResult {
    pub task_id: Uuid,
    pub agent: AgentKind,
    pub success: bool,
    /// Full final output (assistant content, or the error description).
    pub output: String,
    /// One-line human summary.
    pub summary: String,
    pub files_modified: Vec<String>,
    pub files_created: Vec<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl AgentResult {
    pub fn failure(task_id: Uuid, agent: AgentKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            task_id,
            agent,
            success: false,
            summary: first_line(&message, 200),
            output: message,
            files_modified: Vec::new(),
            files_created: Vec::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }

    /// All file paths this task touched.
    pub fn changed_files(&self) -> Vec<String> {
        let mut files = self.files_modified.clone();
        files.extend(self.files_created.iter().cloned());
        files
    }
}

/// Per-session inputs shared by every task.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub workspace_root: PathBuf,
    /// Compact project description injected into prompts (droppable).
    pub project_context: Option<String>,
    /// Compact working-state block injected into prompts.
    pub state_block: Option<String>,
    pub sandbox_enabled: bool,
}

impl SessionContext {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root,
            project_context: None,
            state_block: None,
            sandbox_enabled: true,
        }
    }
}

/// Static executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub default_model: String,
    /// Token budget for the assembled system prompt.
    pub prompt_token_cap: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".to_string(),
            prompt_token_cap: 16_000,
        }
    }
}

// ─── Executor ──────────────────────────────────────────────────────────────

/// Drives one agent task to a terminal [`AgentResult`].
pub struct AgentExecutor {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolExecutor>,
    hooks: Arc<HookRunner>,
    bus: Option<Arc<dyn EventBus>>,
    config: ExecutorConfig,
}

impl AgentExecutor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolExecutor>,
        hooks: Arc<HookRunner>,
        bus: Option<Arc<dyn EventBus>>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            hooks,
            bus,
            config,
        }
    }

    /// Run one task to completion. Never returns `Err`; every failure mode
    /// becomes a failed [`AgentResult`].
    #[tracing::instrument(
        name = "agent.run_task",
        skip_all,
        fields(agent = %kind, task_id = %task_id),
    )]
    pub async fn run_task(
        &self,
        kind: AgentKind,
        task_id: Uuid,
        description: &str,
        session: &SessionContext,
        cancel: CancellationToken,
    ) -> AgentResult {
        let profile = kind.profile();
        let mut messages = self.initial_messages(&profile, description, session);
        let tool_defs = self.tools.registry().definitions_for(kind.as_str());
        let tool_ctx = ToolContext {
            working_dir: session.workspace_root.clone(),
            sandbox: profile.sandbox_for(&session.workspace_root),
            sandbox_enabled: session.sandbox_enabled,
        };
        let model = profile.model(&self.config.default_model);

        let mut prompt_tokens = 0u32;
        let mut completion_tokens = 0u32;
        let mut files_modified: Vec<String> = Vec::new();
        let mut files_created: Vec<String> = Vec::new();

        for turn in 0..profile.max_turns {
            if cancel.is_cancelled() {
                return AgentResult::failure(task_id, kind, format!("aborted before turn {turn}"));
            }

            let request = CompletionRequest::new(model.clone(), messages.clone())
                .with_tools((*tool_defs).clone());

            let response = tokio::select! {
                _ = cancel.cancelled() => {
                    return AgentResult::failure(task_id, kind, "aborted during LLM exchange");
                }
                r = self.provider.complete(request) => r,
            };
            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    return AgentResult::failure(task_id, kind, format!("provider error: {e}"));
                }
            };

            if let Some(usage) = response.usage {
                prompt_tokens += usage.prompt_tokens;
                completion_tokens += usage.completion_tokens;
                if let Some(bus) = &self.bus {
                    let _ = bus.publish(RuntimeEvent::TokenUsage {
                        agent: kind.as_str().to_string(),
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                    });
                }
            }

            let finish = response.finish_reason.as_deref().unwrap_or("stop");
            if finish == "length" {
                // Truncated output: ask the model to finish what it started.
                messages.push(Message::assistant(response.content));
                messages.push(Message::user(CONTINUATION_NUDGE));
                continue;
            }
            if finish == "stop" || response.tool_calls.is_empty() {
                return AgentResult {
                    task_id,
                    agent: kind,
                    success: true,
                    summary: first_line(&response.content, 200),
                    output: response.content,
                    files_modified,
                    files_created,
                    prompt_tokens,
                    completion_tokens,
                };
            }

            messages.push(Message::assistant_with_tools(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let args: Value = serde_json::from_str(&call.arguments)
                    .ok()
                    .filter(Value::is_object)
                    .unwrap_or_else(|| Value::Object(Default::default()));

                let pre = self
                    .hooks
                    .run(
                        HookPoint::PreToolUse,
                        &[
                            ("TOOL", call.name.clone()),
                            ("AGENT", kind.as_str().to_string()),
                            ("ARGS", args.to_string()),
                        ],
                    )
                    .await;

                if self.hooks.is_blocking() && !pre.all_passed() {
                    messages.push(Message::tool(
                        call.id.clone(),
                        cap_error(&format!("blocked by PreToolUse hook: {}", pre.failures.join("; "))),
                    ));
                    continue;
                }

                let outcome = self
                    .tools
                    .invoke(kind.as_str(), &profile.permissions, &call.name, args, &tool_ctx)
                    .await;

                self.hooks
                    .run(
                        HookPoint::PostToolUse,
                        &[
                            ("TOOL", call.name.clone()),
                            ("AGENT", kind.as_str().to_string()),
                            ("SUCCESS", outcome.success.to_string()),
                        ],
                    )
                    .await;

                record_file_change(&outcome.metadata, &mut files_modified, &mut files_created);

                let content = if outcome.success {
                    truncate_tool_output(&outcome.output)
                } else {
                    cap_error(&outcome.output)
                };
                messages.push(Message::tool(call.id.clone(), content));
            }

            let window = self.provider.context_window();
            if estimate_conversation_tokens(&messages) > window * TRIM_THRESHOLD_PERCENT / 100 {
                runner_trim(&mut messages, TRIM_KEEP_TAIL);
            }
        }

        AgentResult::failure(task_id, kind, "max turns reached")
    }

    fn initial_messages(
        &self,
        profile: &AgentProfile,
        description: &str,
        session: &SessionContext,
    ) -> Vec<Message> {
        let mut builder = PromptBuilder::new(self.config.prompt_token_cap);
        builder.add(0, "system", profile.system_prompt());
        if let Some(state) = &session.state_block {
            builder.add(10, "working_state", format!("Current working state:\n{state}"));
        }
        if profile.include_project_context
            && let Some(context) = &session.project_context
        {
            builder.add(20, "project_context", format!("Project context:\n{context}"));
        }

        let built = builder.build();
        if !built.dropped.is_empty() {
            log::debug!(
                "prompt sections dropped for {}: {}",
                profile.kind,
                built.dropped.join(", ")
            );
        }

        vec![Message::system(built.text), Message::user(description)]
    }
}

// ─── Trimming ──────────────────────────────────────────────────────────────

/// Runner-level trim: keep the first two messages (system, user) and the
/// last `keep_tail`, replacing the middle with a single truncation marker.
///
/// The tail boundary is walked backwards past any tool message so a
/// `tool_calls`/`tool` pairing is never split.
pub fn runner_trim(messages: &mut Vec<Message>, keep_tail: usize) {
    if messages.len() <= 2 + keep_tail + 1 {
        return;
    }

    let mut tail_start = messages.len() - keep_tail;
    while tail_start > 2 && messages[tail_start].role == MessageRole::Tool {
        tail_start -= 1;
    }
    if tail_start <= 2 {
        return;
    }

    let tail: Vec<Message> = messages.drain(tail_start..).collect();
    messages.truncate(2);
    messages.push(Message::user(TRIM_MARKER));
    messages.extend(tail);
}

// ─── Output shaping ────────────────────────────────────────────────────────

/// Truncate an oversized tool output, preserving a fixed head and tail of
/// lines with a `[… N lines truncated …]` marker in between.
pub fn truncate_tool_output(output: &str) -> String {
    if output.len() <= MAX_TOOL_OUTPUT_CHARS {
        return output.to_string();
    }

    let lines: Vec<&str> = output.lines().collect();
    if lines.len() > TRUNCATE_HEAD_LINES + TRUNCATE_TAIL_LINES {
        let dropped = lines.len() - TRUNCATE_HEAD_LINES - TRUNCATE_TAIL_LINES;
        let head = lines[..TRUNCATE_HEAD_LINES].join("\n");
        let tail = lines[lines.len() - TRUNCATE_TAIL_LINES..].join("\n");
        return format!("{head}\n[… {dropped} lines truncated …]\n{tail}");
    }

    // Few but enormous lines: fall back to a character split.
    let head: String = output.chars().take(MAX_TOOL_OUTPUT_CHARS * 3 / 4).collect();
    let tail_len = MAX_TOOL_OUTPUT_CHARS / 8;
    let tail: String = output
        .chars()
        .skip(output.chars().count().saturating_sub(tail_len))
        .collect();
    format!("{head}\n[… 1 lines truncated …]\n{tail}")
}

/// Shape a failed tool outcome into a short `ERROR: …` message.
fn cap_error(message: &str) -> String {
    let mut text = format!("ERROR: {message}");
    if text.len() > MAX_ERROR_CHARS {
        text.truncate(
            text.char_indices()
                .nth(MAX_ERROR_CHARS - 1)
                .map(|(i, _)| i)
                .unwrap_or(text.len()),
        );
        text.push('…');
    }
    text
}

fn record_file_change(
    metadata: &Option<Value>,
    modified: &mut Vec<String>,
    created: &mut Vec<String>,
) {
    let Some(meta) = metadata else { return };
    let (Some(path), Some(op)) = (
        meta.get("path").and_then(Value::as_str),
        meta.get("op").and_then(Value::as_str),
    ) else {
        return;
    };

    let list = match op {
        "created" => created,
        "modified" => modified,
        _ => return,
    };
    if !list.iter().any(|p| p == path) {
        list.push(path.to_string());
    }
}

fn first_line(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        let truncated: String = line.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}
