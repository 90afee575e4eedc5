use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// All events that flow through the runtime event bus.
///
/// Channel names follow the `stage:verb` convention consumed by the tracer,
/// metrics collector, and UI progress rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// An agent task was dispatched.
    AgentStart {
        task_id: String,
        agent: String,
        description: String,
    },
    /// An agent task reached a terminal result.
    AgentComplete {
        task_id: String,
        agent: String,
        success: bool,
        summary: String,
    },
    /// An agent task failed with an error.
    AgentError {
        task_id: String,
        agent: String,
        message: String,
    },
    /// Token accounting for one LLM exchange.
    TokenUsage {
        agent: String,
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// A tool call is about to execute.
    ToolBefore {
        tool: String,
        agent: String,
    },
    /// A tool call finished.
    ToolAfter {
        tool: String,
        agent: String,
        success: bool,
    },
    /// A plan was produced by the planner.
    PlanCreated {
        summary: String,
        task_count: usize,
    },
    /// The session history was compacted.
    SessionCompacted {
        dropped_messages: usize,
    },
}

impl RuntimeEvent {
    /// The bus channel this event belongs to.
    pub fn channel(&self) -> &'static str {
        match self {
            RuntimeEvent::AgentStart { .. } => "agent:start",
            RuntimeEvent::AgentComplete { .. } => "agent:complete",
            RuntimeEvent::AgentError { .. } => "agent:error",
            RuntimeEvent::TokenUsage { .. } => "token:usage",
            RuntimeEvent::ToolBefore { .. } => "tool:before",
            RuntimeEvent::ToolAfter { .. } => "tool:after",
            RuntimeEvent::PlanCreated { .. } => "plan:created",
            RuntimeEvent::SessionCompacted { .. } => "session:compacted",
        }
    }
}

/// Selects which event channels a subscriber is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    AgentStart,
    AgentComplete,
    AgentError,
    TokenUsage,
    ToolBefore,
    ToolAfter,
    PlanCreated,
    SessionCompacted,
    /// Matches every variant.
    All,
}

impl EventType {
    /// Returns true if this filter matches `event`.
    pub fn matches(&self, event: &RuntimeEvent) -> bool {
        match self {
            Self::All => true,
            Self::AgentStart => matches!(event, RuntimeEvent::AgentStart { .. }),
            Self::AgentComplete => matches!(event, RuntimeEvent::AgentComplete { .. }),
            Self::AgentError => matches!(event, RuntimeEvent::AgentError { .. }),
            Self::TokenUsage => matches!(event, RuntimeEvent::TokenUsage { .. }),
            Self::ToolBefore => matches!(event, RuntimeEvent::ToolBefore { .. }),
            Self::ToolAfter => matches!(event, RuntimeEvent::ToolAfter { .. }),
            Self::PlanCreated => matches!(event, RuntimeEvent::PlanCreated { .. }),
            Self::SessionCompacted => matches!(event, RuntimeEvent::SessionCompacted { .. }),
        }
    }
}

/// A set of event types used for filtering subscriptions.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub event_types: Vec<EventType>,
}

impl EventFilter {
    pub fn new(event_types: Vec<EventType>) -> Self {
        Self { event_types }
    }

    pub fn matches(&self, event: &RuntimeEvent) -> bool {
        self.event_types.iter().any(|t| t.matches(event))
    }
}

/// Central pub/sub bus for runtime events.
///
/// All returned `Receiver`s receive every published event; callers filter
/// with [`EventFilter::matches`]. Receivers are dropped to unsubscribe (the
/// UI attaches one per REPL turn and drops it afterwards).
pub trait EventBus: Send + Sync {
    /// Publish an event to all active subscribers.
    fn publish(&self, event: RuntimeEvent) -> Result<(), String>;

    /// Subscribe to all events.
    fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent>;

    /// Subscribe to events, pre-scoped to the given filter.
    ///
    /// The returned receiver still carries all events; consumers should call
    /// [`EventFilter::matches`] to discard unwanted ones.
    fn subscribe_filtered(&self, filter: EventFilter) -> broadcast::Receiver<RuntimeEvent>;
}
