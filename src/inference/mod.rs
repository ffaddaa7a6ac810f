//! Inference client for a local LM Studio server.
//!
//! This module handles all communication with the OpenAI-compatible
//! endpoint LM Studio exposes:
//! - Non-streaming and streaming chat completions
//! - Embeddings and cosine similarity
//! - SSE stream parsing
//! - Result caching behind a pluggable store
//! - Configuration loading from env vars or YAML

pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod responses;
pub mod streaming;
pub mod tokens;
pub mod types;

// Re-exports for convenience
pub use cache::{CacheStore, FileCache, MemoryCache};
pub use client::LmStudioClient;
pub use config::{CacheDriver, LmStudioConfig};
pub use errors::LmStudioError;
pub use responses::{cosine_similarity, ChatResult, EmbeddingResult};
pub use types::{
    ChatMessage, ChatOptions, EmbeddingOptions, FunctionCall, Role, ToolCall, ToolDefinition,
};
