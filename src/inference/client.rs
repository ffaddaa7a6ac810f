//! LM Studio API client.
//!
//! Builds chat/embedding requests from per-call options merged over the
//! configuration defaults, sends them to the local server, and wraps the
//! answer in a result value. Chat and embedding results go through the
//! injected cache when caching is enabled.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::Level;

use super::cache::{self, CacheStore};
use super::config::LmStudioConfig;
use super::errors::LmStudioError;
use super::responses::{ChatResult, EmbeddingResult};
use super::streaming::parse_sse_stream;
use super::tokens;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatOptions, EmbeddingApiResponse,
    EmbeddingOptions, EmbeddingRequest,
};
use crate::services::{Conversation, HealthService, ModelService};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── LmStudioClient ──────────────────────────────────────────────────────────

/// Client for a local LM Studio server.
///
/// Holds an immutable configuration snapshot and the cache store. Every
/// collaborator (`Conversation`, `ModelService`, `HealthService`) borrows
/// the client instead of reaching for global state.
pub struct LmStudioClient {
    http: HttpClient,
    config: LmStudioConfig,
    cache: Arc<dyn CacheStore>,
}

impl LmStudioClient {
    /// Create a client using the cache store selected by `cache.driver`.
    pub fn new(config: LmStudioConfig) -> Result<Self, LmStudioError> {
        let cache = cache::store_for(&config);
        Self::with_cache(config, cache)
    }

    /// Create a client with an explicit cache store.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn with_cache(
        config: LmStudioConfig,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self, LmStudioError> {
        config.validate()?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout())
            .build()
            .map_err(|e| LmStudioError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            config,
            cache,
        })
    }

    pub fn config(&self) -> &LmStudioConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    // ─── Chat Completion ─────────────────────────────────────────────────

    /// Send a chat message and wait for the full reply.
    pub async fn chat(
        &self,
        message: &str,
        options: &ChatOptions,
    ) -> Result<ChatResult, LmStudioError> {
        let key = self.cache_key("chat", message, options)?;
        if let Some(hit) = self.cached::<ChatResult>(key.as_deref())? {
            return Ok(hit);
        }

        let body = self.build_chat_request(message, options, false);
        self.log(
            "Sending chat request",
            &json!({
                "model": body.model,
                "message_count": body.messages.len(),
                "max_tokens": body.max_tokens,
                "has_tools": body.tools.is_some(),
            }),
        );

        let resp: ChatCompletionResponse = match self
            .post_json("chat", "chat/completions", &body)
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.log("Chat request failed", &json!({ "error": e.to_string() }));
                return Err(e);
            }
        };

        let result = ChatResult::from_completion(resp);
        self.log(
            "Received chat response",
            &json!({
                "id": result.metadata().get("id"),
                "finish_reason": result.finish_reason(),
                "tokens_used": result.tokens_used(),
            }),
        );

        self.store(key.as_deref(), &result)?;
        Ok(result)
    }

    /// Build the request body for a chat completion.
    ///
    /// Call-site options win over config defaults. `options.messages`
    /// replaces the single user message built from `message`; a
    /// `options.system` prompt is then prepended.
    pub fn build_chat_request(
        &self,
        message: &str,
        options: &ChatOptions,
        stream: bool,
    ) -> ChatCompletionRequest {
        let defaults = &self.config.defaults;

        let mut messages = options
            .messages
            .clone()
            .unwrap_or_else(|| vec![ChatMessage::user(message)]);
        if let Some(ref system) = options.system {
            messages.insert(0, ChatMessage::system(system.clone()));
        }

        ChatCompletionRequest {
            model: options
                .model
                .clone()
                .unwrap_or_else(|| self.config.default_model.clone()),
            messages,
            max_tokens: options.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: options.temperature.unwrap_or(defaults.temperature),
            top_p: options.top_p.unwrap_or(defaults.top_p),
            frequency_penalty: options
                .frequency_penalty
                .unwrap_or(defaults.frequency_penalty),
            presence_penalty: options.presence_penalty.unwrap_or(defaults.presence_penalty),
            tools: options.tools.clone(),
            tool_choice: options.tool_choice.clone(),
            stream,
        }
    }

    // ─── Streaming ───────────────────────────────────────────────────────

    /// Stream a chat reply, calling `on_chunk` with each text fragment.
    ///
    /// Fails with `StreamingDisabled` before any network I/O when streaming
    /// is turned off. The sink runs inline with the read loop.
    pub async fn stream<F>(
        &self,
        message: &str,
        mut on_chunk: F,
        options: &ChatOptions,
    ) -> Result<(), LmStudioError>
    where
        F: FnMut(&str),
    {
        let fragments = self.stream_fragments(message, options).await?;
        futures::pin_mut!(fragments);

        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) => on_chunk(&text),
                Err(e) => {
                    self.log("Stream request failed", &json!({ "error": e.to_string() }));
                    return Err(e);
                }
            }
        }

        self.log("Stream completed", &Value::Null);
        Ok(())
    }

    /// Open a streaming chat request and return its text fragments.
    pub async fn stream_fragments(
        &self,
        message: &str,
        options: &ChatOptions,
    ) -> Result<impl Stream<Item = Result<String, LmStudioError>>, LmStudioError> {
        if !self.config.streaming.enabled {
            return Err(LmStudioError::StreamingDisabled);
        }

        let body = self.build_chat_request(message, options, true);
        let url = self.endpoint("chat/completions");
        self.log(
            "Starting stream request",
            &json!({
                "url": url,
                "model": body.model,
                "message_count": body.messages.len(),
            }),
        );

        let sent = self
            .http
            .post(&url)
            .json(&body)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| LmStudioError::request("streaming", &e));
        let response = match sent {
            Ok(resp) => check_status("streaming", resp).await,
            Err(e) => Err(e),
        };
        let response = match response {
            Ok(resp) => resp,
            Err(e) => {
                self.log("Stream request failed", &json!({ "error": e.to_string() }));
                return Err(e);
            }
        };

        Ok(parse_sse_stream(
            response.bytes_stream(),
            self.config.streaming.chunk_size,
        ))
    }

    // ─── Embeddings ──────────────────────────────────────────────────────

    /// Generate an embedding vector for `text`.
    ///
    /// The vector length must match the expected dimensionality
    /// (`options.dimensions`, else `embeddings.dimensions`).
    pub async fn embedding(
        &self,
        text: &str,
        options: &EmbeddingOptions,
    ) -> Result<EmbeddingResult, LmStudioError> {
        let key = self.cache_key("embedding", text, options)?;
        if let Some(hit) = self.cached::<EmbeddingResult>(key.as_deref())? {
            return Ok(hit);
        }

        let body = EmbeddingRequest {
            input: text.to_string(),
            model: options
                .model
                .clone()
                .unwrap_or_else(|| self.config.embeddings.model.clone()),
        };
        self.log(
            "Sending embedding request",
            &json!({ "model": body.model, "input_len": body.input.len() }),
        );

        let expected = options
            .dimensions
            .unwrap_or(self.config.embeddings.dimensions);
        let fetched: Result<EmbeddingApiResponse, LmStudioError> =
            self.post_json("embedding", "embeddings", &body).await;
        let result = fetched.and_then(EmbeddingResult::from_api).and_then(|r| {
            r.validate_dimensions(expected)?;
            Ok(r)
        });
        let result = match result {
            Ok(r) => r,
            Err(e) => {
                self.log("Embedding request failed", &json!({ "error": e.to_string() }));
                return Err(e);
            }
        };

        self.log(
            "Received embedding response",
            &json!({ "dimensions": result.dimensions() }),
        );

        self.store(key.as_deref(), &result)?;
        Ok(result)
    }

    // ─── Tokens ──────────────────────────────────────────────────────────

    /// Approximate token count: `ceil(len / 4)`. Not a real tokenizer.
    pub fn count_tokens(&self, text: &str) -> usize {
        tokens::estimate_tokens(text)
    }

    pub fn within_token_limit(&self, text: &str, limit: usize) -> bool {
        tokens::within_limit(text, limit)
    }

    // ─── Collaborators ───────────────────────────────────────────────────

    /// Start a conversation. `options.system`, if set, seeds the history.
    pub fn conversation(&self, options: ChatOptions) -> Conversation<'_> {
        Conversation::new(self, options)
    }

    pub fn models(&self) -> ModelService<'_> {
        ModelService::new(self)
    }

    pub fn health(&self) -> HealthService<'_> {
        HealthService::new(self)
    }

    // ─── HTTP helpers ────────────────────────────────────────────────────

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_base())
    }

    async fn post_json<B, T>(&self, context: &str, path: &str, body: &B) -> Result<T, LmStudioError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LmStudioError::request(context, &e))?;
        decode_json(context, check_status(context, response).await?).await
    }

    /// `GET {base_url}/{path}` decoded as JSON, with an optional per-request timeout.
    pub(crate) async fn get_json<T>(
        &self,
        context: &str,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<T, LmStudioError>
    where
        T: DeserializeOwned,
    {
        let mut request = self.http.get(self.endpoint(path));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| LmStudioError::request(context, &e))?;
        decode_json(context, check_status(context, response).await?).await
    }

    /// Whether `GET {base_url}/{path}` answers 200. Transport errors are `false`.
    pub(crate) async fn probe(&self, path: &str, timeout: Duration) -> bool {
        match self.http.get(self.endpoint(path)).timeout(timeout).send().await {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!(error = %e, "health probe failed");
                false
            }
        }
    }

    // ─── Cache helpers ───────────────────────────────────────────────────

    /// Content-addressed key, or `None` when result caching is off.
    fn cache_key<O: Serialize>(
        &self,
        kind: &str,
        content: &str,
        options: &O,
    ) -> Result<Option<String>, LmStudioError> {
        if !self.config.cache.enabled {
            return Ok(None);
        }
        let options_json = serde_json::to_string(options).map_err(|e| LmStudioError::Cache {
            reason: format!("failed to serialize options: {e}"),
        })?;
        Ok(Some(cache::cache_key(kind, content, &options_json)))
    }

    fn cached<T: DeserializeOwned>(&self, key: Option<&str>) -> Result<Option<T>, LmStudioError> {
        let Some(key) = key else {
            return Ok(None);
        };
        let Some(value) = self.cache.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(hit) => {
                tracing::debug!(key, "cache hit");
                Ok(Some(hit))
            }
            Err(e) => {
                // Stale shape from an older version; refetch
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                self.cache.forget(key)?;
                Ok(None)
            }
        }
    }

    fn store<T: Serialize>(&self, key: Option<&str>, value: &T) -> Result<(), LmStudioError> {
        let Some(key) = key else {
            return Ok(());
        };
        let value = serde_json::to_value(value).map_err(|e| LmStudioError::Cache {
            reason: format!("failed to serialize result: {e}"),
        })?;
        self.cache.put(key, value, self.config.cache_ttl())
    }

    // ─── Logging ─────────────────────────────────────────────────────────

    /// Emit a client log event when logging is enabled.
    ///
    /// Every event goes out at `logging.level` with `logging.channel`
    /// attached as a field.
    pub(crate) fn log(&self, message: &str, context: &Value) {
        let logging = &self.config.logging;
        if !logging.enabled {
            return;
        }
        let level = Level::from_str(&logging.level).unwrap_or(Level::DEBUG);
        let channel = logging.channel.as_str();
        if level == Level::ERROR {
            tracing::error!(channel, context = %context, "[LM Studio] {message}");
        } else if level == Level::WARN {
            tracing::warn!(channel, context = %context, "[LM Studio] {message}");
        } else if level == Level::INFO {
            tracing::info!(channel, context = %context, "[LM Studio] {message}");
        } else if level == Level::DEBUG {
            tracing::debug!(channel, context = %context, "[LM Studio] {message}");
        } else {
            tracing::trace!(channel, context = %context, "[LM Studio] {message}");
        }
    }
}

/// Map a non-2xx response to `LmStudioError::Http`.
async fn check_status(
    context: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, LmStudioError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LmStudioError::Http {
        context: context.to_string(),
        status: status.as_u16(),
        body,
    })
}

async fn decode_json<T: DeserializeOwned>(
    context: &str,
    response: reqwest::Response,
) -> Result<T, LmStudioError> {
    let text = response
        .text()
        .await
        .map_err(|e| LmStudioError::request(context, &e))?;
    serde_json::from_str(&text).map_err(|e| LmStudioError::InvalidResponse {
        context: context.to_string(),
        reason: format!("failed to parse response body: {e}"),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
