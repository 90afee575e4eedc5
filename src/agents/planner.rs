//! The planner: classifies user input into a direct answer or a structured
//! plan of specialist tasks.
//!
//! One LLM exchange with a fixed system prompt; the reply is scanned for the
//! first balanced JSON object (prose around it is tolerated). A candidate
//! object counts as a plan only when it carries a string `plan` and an array
//! `tasks`. A balanced candidate that mentions those keys but is not valid
//! JSON is a [`Error::Parse`]; every other reply is a direct answer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ai::provider::LlmProvider;
use crate::ai::types::{CompletionRequest, Message};
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, RuntimeEvent};
use crate::prompts::PLANNER_SYSTEM_PROMPT;

// ─── Plan types ────────────────────────────────────────────────────────────

/// One task in a plan.
///
/// `agent` stays a raw string here; the scheduler resolves it to an
/// [`crate::agents::profiles::AgentKind`] and turns an unknown kind into a
/// failed task rather than a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanTask {
    pub agent: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<usize>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub toon_compact: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exclude_from_summary: bool,
}

/// A goal summary plus an ordered task list forming a DAG.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub plan: String,
    pub tasks: Vec<PlanTask>,
}

impl Plan {
    /// Check the structural invariant: every prerequisite references an
    /// earlier task, which also makes the graph acyclic by construction.
    pub fn validate(&self) -> Result<()> {
        for (index, task) in self.tasks.iter().enumerate() {
            for &dep in &task.depends_on {
                if dep >= index {
                    return Err(Error::Parse(format!(
                        "task {index} depends on task {dep}, which is not an earlier task"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Outcome of one planner exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutcome {
    /// The model answered the user directly; surface verbatim.
    DirectAnswer(String),
    Plan(Plan),
}

// ─── JSON extraction ───────────────────────────────────────────────────────

/// Extract the first balanced JSON object from `text`.
///
/// Scans from the first `{`, tracking brace depth with string and escape
/// state, and returns the slice once depth returns to zero. Returns `None`
/// when no balanced object exists.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Interpret an LLM reply as either a plan or a direct answer.
pub fn parse_planner_output(text: &str) -> Result<PlannerOutcome> {
    let Some(candidate) = extract_json_object(text) else {
        return Ok(PlannerOutcome::DirectAnswer(text.to_string()));
    };

    let value: serde_json::Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(e) => {
            // A brace-balanced blob that was clearly meant as a plan is a
            // parse failure; anything else is prose with stray braces.
            if candidate.contains("\"plan\"") && candidate.contains("\"tasks\"") {
                return Err(Error::Parse(format!("malformed plan JSON: {e}")));
            }
            return Ok(PlannerOutcome::DirectAnswer(text.to_string()));
        }
    };

    let looks_like_plan = value.get("plan").is_some_and(|p| p.is_string())
        && value.get("tasks").is_some_and(|t| t.is_array());
    if !looks_like_plan {
        return Ok(PlannerOutcome::DirectAnswer(text.to_string()));
    }

    let plan: Plan = serde_json::from_value(value)
        .map_err(|e| Error::Parse(format!("malformed plan JSON: {e}")))?;
    plan.validate()?;
    Ok(PlannerOutcome::Plan(plan))
}

// ─── Planner ───────────────────────────────────────────────────────────────

pub struct Planner {
    provider: Arc<dyn LlmProvider>,
    model: String,
    bus: Option<Arc<dyn EventBus>>,
}

impl Planner {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Classify user input into a plan or a direct answer.
    ///
    /// `project_context` is a compact description of the project injected
    /// below the fixed system prompt when present.
    #[tracing::instrument(name = "planner.classify", skip_all, fields(input_len = input.len()))]
    pub async fn classify(
        &self,
        input: &str,
        project_context: Option<&str>,
    ) -> Result<PlannerOutcome> {
        let mut system = PLANNER_SYSTEM_PROMPT.to_string();
        if let Some(context) = project_context {
            system.push_str("\n\nProject context:\n");
            system.push_str(context);
        }

        let request = CompletionRequest::new(
            self.model.clone(),
            vec![Message::system(system), Message::user(input)],
        );

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(Error::Provider)?;

        let outcome = parse_planner_output(&response.content)?;
        if let PlannerOutcome::Plan(plan) = &outcome {
            log::info!("planned {} task(s): {}", plan.tasks.len(), plan.plan);
            if let Some(bus) = &self.bus {
                let _ = bus.publish(RuntimeEvent::PlanCreated {
                    summary: plan.plan.clone(),
                    task_count: plan.tasks.len(),
                });
            }
        }
        Ok(outcome)
    }
}
