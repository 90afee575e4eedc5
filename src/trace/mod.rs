//! Hierarchical timed spans and metrics aggregation.
//!
//! The tracer keeps a stack of open spans per trace. Spans normally close in
//! LIFO order, but error paths may close a non-top span; `end_span` removes
//! the span by identity wherever it sits in the stack so the structure stays
//! consistent. The metrics collector subscribes to the event bus and
//! aggregates per-agent counters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::event_bus::{EventBus, RuntimeEvent};

// ─── Spans ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Orchestrator,
    Agent,
    LlmCall,
    Tool,
    Hook,
}

/// One completed or in-flight span.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub id: Uuid,
    pub kind: SpanKind,
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<Span>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A finished trace: a session id and the root span tree.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub session_id: String,
    pub root: Span,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

struct SpanNode {
    kind: SpanKind,
    name: String,
    attributes: HashMap<String, String>,
    parent: Option<Uuid>,
    children: Vec<Uuid>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

struct TracerInner {
    session_id: String,
    root: Option<Uuid>,
    nodes: HashMap<Uuid, SpanNode>,
    /// Open spans, outermost first.
    stack: Vec<Uuid>,
    started_at: DateTime<Utc>,
}

/// Builds one span tree per session.
pub struct Tracer {
    inner: Mutex<TracerInner>,
}

impl Tracer {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(TracerInner {
                session_id: session_id.into(),
                root: None,
                nodes: HashMap::new(),
                stack: Vec::new(),
                started_at: Utc::now(),
            }),
        }
    }

    /// Open a span as a child of the current innermost open span.
    pub fn start_span(&self, kind: SpanKind, name: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let parent = inner.stack.last().copied();
        let node = SpanNode {
            kind,
            name: name.into(),
            attributes: HashMap::new(),
            parent,
            children: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        };
        inner.nodes.insert(id, node);

        match parent {
            Some(pid) => {
                if let Some(parent_node) = inner.nodes.get_mut(&pid) {
                    parent_node.children.push(id);
                }
            }
            None => {
                if inner.root.is_none() {
                    inner.root = Some(id);
                }
            }
        }
        inner.stack.push(id);
        id
    }

    /// Attach an attribute to an open or closed span.
    pub fn set_attribute(&self, span: Uuid, key: impl Into<String>, value: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(node) = inner.nodes.get_mut(&span) {
            node.attributes.insert(key.into(), value.into());
        }
    }

    /// Close a span. The span is removed from the open stack by identity,
    /// so closing out of order (an error path unwinding past children) does
    /// not corrupt the stack.
    pub fn end_span(&self, span: Uuid) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.stack.retain(|&open| open != span);
        if let Some(node) = inner.nodes.get_mut(&span)
            && node.ended_at.is_none()
        {
            node.ended_at = Some(Utc::now());
        }
    }

    /// Number of currently open spans.
    pub fn open_spans(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).stack.len()
    }

    /// Assemble the finished trace. Open spans are closed as of now.
    pub fn finish(&self) -> Option<Trace> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        for id in inner.stack.clone() {
            if let Some(node) = inner.nodes.get_mut(&id) {
                node.ended_at.get_or_insert(now);
            }
        }
        inner.stack.clear();

        let root = inner.root?;
        let tree = build_span(&inner.nodes, root)?;
        Some(Trace {
            session_id: inner.session_id.clone(),
            started_at: inner.started_at,
            ended_at: tree.ended_at,
            root: tree,
        })
    }
}

fn build_span(nodes: &HashMap<Uuid, SpanNode>, id: Uuid) -> Option<Span> {
    let node = nodes.get(&id)?;
    let children = node
        .children
        .iter()
        .filter_map(|&child| build_span(nodes, child))
        .collect();
    Some(Span {
        id,
        kind: node.kind,
        name: node.name.clone(),
        attributes: node.attributes.clone(),
        children,
        started_at: node.started_at,
        ended_at: node.ended_at,
    })
}

// ─── Metrics ───────────────────────────────────────────────────────────────

/// Aggregated counters for one agent kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentMetrics {
    pub runs: u64,
    pub failures: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Snapshot of all aggregated metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub per_agent: HashMap<String, AgentMetrics>,
    pub tool_calls: HashMap<String, u64>,
    pub tool_failures: HashMap<String, u64>,
}

/// Subscribes to the event bus and aggregates counters.
///
/// Dropping the collector's handle stops the background task the next time
/// the bus sends an event.
pub struct MetricsCollector {
    snapshot: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    /// Attach to a bus; the returned collector aggregates until dropped.
    pub fn attach(bus: &dyn EventBus) -> Self {
        let snapshot = Arc::new(Mutex::new(MetricsSnapshot::default()));
        let state = Arc::downgrade(&snapshot);
        let mut rx = bus.subscribe();

        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                let Some(state) = state.upgrade() else { break };
                let mut snapshot = state.lock().unwrap_or_else(|e| e.into_inner());
                match event {
                    RuntimeEvent::AgentStart { agent, .. } => {
                        snapshot.per_agent.entry(agent).or_default().runs += 1;
                    }
                    RuntimeEvent::AgentComplete { agent, success, .. } => {
                        if !success {
                            snapshot.per_agent.entry(agent).or_default().failures += 1;
                        }
                    }
                    RuntimeEvent::AgentError { agent, .. } => {
                        snapshot.per_agent.entry(agent).or_default().failures += 1;
                    }
                    RuntimeEvent::TokenUsage {
                        agent,
                        prompt_tokens,
                        completion_tokens,
                    } => {
                        let entry = snapshot.per_agent.entry(agent).or_default();
                        entry.prompt_tokens += u64::from(prompt_tokens);
                        entry.completion_tokens += u64::from(completion_tokens);
                    }
                    RuntimeEvent::ToolAfter { tool, success, .. } => {
                        *snapshot.tool_calls.entry(tool.clone()).or_default() += 1;
                        if !success {
                            *snapshot.tool_failures.entry(tool).or_default() += 1;
                        }
                    }
                    _ => {}
                }
            }
        });

        Self { snapshot }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
