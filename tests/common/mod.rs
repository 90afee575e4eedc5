//! Shared test harness: a scripted LLM provider with per-route response
//! queues, keyed by a needle matched against each request's first message.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Barrier;

use foreman::ai::provider::{LlmProvider, Result as ProviderResult};
use foreman::ai::types::{CompletionRequest, CompletionResponse, TokenUsage, ToolCall};

/// One scripted step for a route.
pub enum Step {
    Reply(CompletionResponse),
    /// Wait on a barrier, then reply. Used to prove tasks run in the same
    /// scheduler batch: a sequential dispatch would deadlock here.
    BarrierThenReply(Arc<Barrier>, CompletionResponse),
    /// Never complete; relies on the caller's timeout or cancellation.
    Hang,
}

struct Route {
    needle: String,
    steps: VecDeque<Step>,
}

pub struct ScriptedProvider {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<CompletionRequest>>,
    window: usize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            window: 128_000,
        }
    }

    /// Queue steps for requests whose first message contains `needle`.
    pub fn route(&self, needle: &str, steps: Vec<Step>) {
        let mut routes = self.routes.lock().unwrap();
        if let Some(route) = routes.iter_mut().find(|r| r.needle == needle) {
            route.steps.extend(steps);
        } else {
            routes.push(Route {
                needle: needle.to_string(),
                steps: steps.into(),
            });
        }
    }

    /// All requests seen so far, in call order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// How many requests matched `needle`.
    pub fn call_count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.messages
                    .first()
                    .is_some_and(|m| m.content.contains(needle))
            })
            .count()
    }

    /// The order in which routed requests arrived, as route needles.
    pub fn call_sequence(&self, needles: &[&str]) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| {
                let first = r.messages.first()?;
                needles
                    .iter()
                    .find(|n| first.content.contains(*n))
                    .map(|n| n.to_string())
            })
            .collect()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        self.calls.lock().unwrap().push(request.clone());

        let first = request
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let step = {
            let mut routes = self.routes.lock().unwrap();
            let route = routes
                .iter_mut()
                .find(|r| first.contains(&r.needle))
                .ok_or_else(|| format!("no scripted route for request starting: {:.80}", first))?;
            route
                .steps
                .pop_front()
                .ok_or_else(|| format!("route '{}' exhausted", route.needle))?
        };

        match step {
            Step::Reply(response) => Ok(response),
            Step::BarrierThenReply(barrier, response) => {
                barrier.wait().await;
                Ok(response)
            }
            Step::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    fn context_window(&self) -> usize {
        self.window
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

// ─── Response helpers ──────────────────────────────────────────────────────

pub fn reply(content: &str) -> Step {
    Step::Reply(text_response(content))
}

pub fn text_response(content: &str) -> CompletionResponse {
    CompletionResponse {
        content: content.to_string(),
        tool_calls: Vec::new(),
        model: "scripted".to_string(),
        usage: Some(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        finish_reason: Some("stop".to_string()),
    }
}

/// An assistant turn carrying tool calls (`finish_reason = "tool_calls"`).
pub fn tool_reply(calls: &[(&str, &str, serde_json::Value)]) -> Step {
    Step::Reply(CompletionResponse {
        content: String::new(),
        tool_calls: calls
            .iter()
            .map(|(id, name, args)| ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args.to_string(),
            })
            .collect(),
        model: "scripted".to_string(),
        usage: Some(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        finish_reason: Some("tool_calls".to_string()),
    })
}

// ─── Route needles (distinctive fragments of built-in prompts) ─────────────

pub const PLANNER_NEEDLE: &str = "planning component";
pub const SEARCH_NEEDLE: &str = "code-search agent";
pub const CODE_NEEDLE: &str = "coding agent";
pub const REVIEW_NEEDLE: &str = "code-review agent";
pub const QA_NEEDLE: &str = "quality-assurance agent";
pub const COMPACT_NEEDLE: &str = "Summarise the conversation";
