//! Session-level conversation compaction.
//!
//! Invoked before each new user turn. When the estimated token total
//! crosses the threshold fraction of the model's context window, the middle
//! of the history is replaced by a one-shot LLM summary: the first message
//! is preserved verbatim (it anchors the session), the last `keep_last`
//! messages are kept, and a summary notice sits in between. A safety net
//! caps the history at `max_messages` regardless of token counts.

use std::sync::Arc;

use crate::ai::provider::LlmProvider;
use crate::ai::types::{
    CompletionRequest, Message, MessageRole, estimate_conversation_tokens,
};
use crate::prompts::COMPACTION_PROMPT;

#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Percentage of the context window that triggers a compact.
    pub threshold_percent: usize,
    /// Messages kept verbatim at the end of the history.
    pub keep_last: usize,
    /// Hard cap on history length, token pressure or not.
    pub max_messages: usize,
    /// Per-source-message character cap when feeding the summariser.
    pub per_message_chars: usize,
    /// Output budget for the summary call.
    pub summary_max_tokens: u32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 75,
            keep_last: 10,
            max_messages: 50,
            per_message_chars: 500,
            summary_max_tokens: 300,
        }
    }
}

/// Compact `messages` in place when needed. Returns the number of messages
/// dropped, or `None` when no compaction was necessary.
pub async fn compact_session(
    provider: &Arc<dyn LlmProvider>,
    model: &str,
    messages: &mut Vec<Message>,
    config: &CompactionConfig,
) -> Option<usize> {
    let before = messages.len();
    let threshold = provider.context_window() * config.threshold_percent / 100;
    let over_tokens = estimate_conversation_tokens(messages) > threshold;

    if over_tokens && messages.len() > config.keep_last + 2 {
        summarise_middle(provider, model, messages, config).await;
    }

    // Safety net: bounded length regardless of token counts.
    if messages.len() > config.max_messages {
        let keep_tail = config.max_messages - 1;
        let tail_start = boundary_before_tail(messages, keep_tail);
        let tail: Vec<Message> = messages.drain(tail_start..).collect();
        messages.truncate(1);
        messages.extend(tail);
    }

    (messages.len() < before).then(|| before - messages.len())
}

async fn summarise_middle(
    provider: &Arc<dyn LlmProvider>,
    model: &str,
    messages: &mut Vec<Message>,
    config: &CompactionConfig,
) {
    let tail_start = boundary_before_tail(messages, config.keep_last);
    if tail_start <= 1 {
        return;
    }
    let middle = &messages[1..tail_start];
    if middle.is_empty() {
        return;
    }

    let excerpt = middle
        .iter()
        .map(|m| {
            let role = match m.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::Tool => "tool",
            };
            let content: String = m.content.chars().take(config.per_message_chars).collect();
            format!("{role}: {content}")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let request = CompletionRequest::new(
        model.to_string(),
        vec![Message::user(format!("{COMPACTION_PROMPT}\n\n{excerpt}"))],
    )
    .with_max_tokens(config.summary_max_tokens);

    let dropped = middle.len();
    let summary = match provider.complete(request).await {
        Ok(response) => response.content,
        Err(e) => {
            log::warn!("compaction summary call failed: {e}");
            format!("[{dropped} messages compacted]")
        }
    };

    let tail: Vec<Message> = messages.drain(tail_start..).collect();
    messages.truncate(1);
    messages.push(Message::system(format!(
        "Earlier conversation was compacted. Summary:\n{summary}"
    )));
    messages.extend(tail);
}

/// Index where the kept tail starts, walked backwards past tool messages so
/// a tool_calls/tool pairing is never split at the boundary.
fn boundary_before_tail(messages: &[Message], keep_tail: usize) -> usize {
    let mut start = messages.len().saturating_sub(keep_tail);
    while start > 1 && messages[start].role == MessageRole::Tool {
        start -= 1;
    }
    start
}
