//! The LLM provider capability trait.
//!
//! The runtime core never talks HTTP itself; everything the executor,
//! planner, and compactor need from a model goes through [`LlmProvider`].
//! Transport-level retry lives in [`crate::ai::reliable::ReliableProvider`].

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use super::types::{CompletionRequest, CompletionResponse, StreamChunk};

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, String>;

/// Type alias for streaming response.
pub type StreamResponse = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a prompt and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Stream a completion response as chunks.
    ///
    /// The default implementation performs a blocking `complete` and yields
    /// it as a single chunk; providers with native streaming override this.
    async fn stream(&self, request: CompletionRequest) -> Result<StreamResponse> {
        let response = self.complete(request).await?;
        let chunk = StreamChunk {
            content: Some(response.content),
            tool_call: None,
            finish_reason: response.finish_reason,
        };
        Ok(Box::pin(futures::stream::once(async move { Ok(chunk) })))
    }

    /// The context window size, in tokens, of the model behind this provider.
    fn context_window(&self) -> usize;

    /// Whether the provider supports function/tool calling.
    fn supports_tools(&self) -> bool;

    /// Provider name for logs and recordings.
    fn provider_name(&self) -> &str;
}
