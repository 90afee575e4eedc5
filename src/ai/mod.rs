//! LLM provider abstraction: chat types, the capability trait, reliability
//! and recording wrappers, and an OpenAI-compatible HTTP adapter.

pub mod openai;
pub mod provider;
pub mod recorder;
pub mod reliable;
pub mod stream;
pub mod types;

pub use provider::{LlmProvider, StreamResponse};
pub use types::{
    CompletionRequest, CompletionResponse, Message, MessageRole, StreamChunk, TokenUsage, ToolCall,
    ToolDefinition,
};
