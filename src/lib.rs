//! Client library for a local LM Studio server.
//!
//! `LmStudioClient` speaks the OpenAI-compatible endpoints LM Studio
//! exposes (`/chat/completions`, `/embeddings`, `/models`). Conversations,
//! model listing, and health checks borrow a client; see [`services`].

pub mod commands;
pub mod inference;
pub mod services;

pub use inference::{
    cosine_similarity, CacheDriver, CacheStore, ChatMessage, ChatOptions, ChatResult,
    EmbeddingOptions, EmbeddingResult, FileCache, LmStudioClient, LmStudioConfig, LmStudioError,
    MemoryCache, Role, ToolCall, ToolDefinition,
};
pub use services::{Conversation, HealthService, HealthStatus, ModelInfo, ModelService};

/// Initialize the tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to this
/// crate and `warn` to everything else. `json` switches to one JSON object
/// per line.
pub fn init_tracing(default_level: &str, json: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lmstudio_client={default_level},warn")));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    // A global subscriber may already be set
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        return;
    }

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "=== lmstudio starting ==="
    );
}
