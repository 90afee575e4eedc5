//! Assembly of streaming chunks into a complete response.
//!
//! Providers with native streaming yield [`StreamChunk`]s carrying content
//! deltas, tool-call fragments, and eventually a finish reason. The
//! assembler folds them into the same [`CompletionResponse`] a blocking
//! `complete` call would have produced, so downstream code has one shape to
//! handle.

use super::types::{CompletionResponse, StreamChunk, ToolCall};

/// Folds a chunk sequence into a [`CompletionResponse`].
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    content: String,
    tool_calls: Vec<PartialToolCall>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one chunk. Tool-call fragments are merged by index: the
    /// first fragment for an index carries the id and name, later ones
    /// append argument text.
    pub fn push(&mut self, chunk: StreamChunk) {
        if let Some(delta) = chunk.content {
            self.content.push_str(&delta);
        }
        if let Some(fragment) = chunk.tool_call {
            while self.tool_calls.len() <= fragment.index {
                self.tool_calls.push(PartialToolCall::default());
            }
            let slot = &mut self.tool_calls[fragment.index];
            if let Some(id) = fragment.id {
                slot.id = id;
            }
            if let Some(name) = fragment.name {
                slot.name = name;
            }
            if let Some(arguments) = fragment.arguments {
                slot.arguments.push_str(&arguments);
            }
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
    }

    /// Whether a finish reason has arrived.
    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Produce the assembled response.
    pub fn finish(self, model: impl Into<String>) -> CompletionResponse {
        CompletionResponse {
            content: self.content,
            tool_calls: self
                .tool_calls
                .into_iter()
                .filter(|c| !c.name.is_empty())
                .map(|c| ToolCall {
                    id: c.id,
                    name: c.name,
                    arguments: c.arguments,
                })
                .collect(),
            model: model.into(),
            usage: None,
            finish_reason: self.finish_reason,
        }
    }
}
