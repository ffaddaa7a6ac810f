//! Result value objects returned by the client.
//!
//! Both types are immutable once built and round-trip through
//! `serde_json::Value` so they can be kept in a `CacheStore`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::LmStudioError;
use super::types::{ChatCompletionResponse, EmbeddingApiResponse, ToolCall};

// ─── ChatResult ──────────────────────────────────────────────────────────────

/// The outcome of one chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    content: String,
    metadata: BTreeMap<String, Value>,
    tokens_used: Option<u64>,
    model: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

impl ChatResult {
    pub fn new(
        content: impl Into<String>,
        metadata: BTreeMap<String, Value>,
        tokens_used: Option<u64>,
        model: Option<String>,
        tool_calls: Option<Vec<ToolCall>>,
    ) -> Self {
        Self {
            content: content.into(),
            metadata,
            tokens_used,
            model,
            tool_calls,
        }
    }

    /// Build from a decoded response body, using the first choice.
    ///
    /// A missing choice or message yields empty content rather than an error.
    pub fn from_completion(resp: ChatCompletionResponse) -> Self {
        let choice = resp.choices.into_iter().next();
        let finish_reason = choice.as_ref().and_then(|c| c.finish_reason.clone());
        let message = choice.and_then(|c| c.message);
        let (content, tool_calls) = match message {
            Some(m) => (m.content.unwrap_or_default(), m.tool_calls),
            None => (String::new(), None),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("id".to_string(), json!(resp.id));
        metadata.insert("created".to_string(), json!(resp.created));
        metadata.insert("finish_reason".to_string(), json!(finish_reason));

        Self {
            content,
            metadata,
            tokens_used: resp.usage.and_then(|u| u.total_tokens),
            model: resp.model,
            tool_calls,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn tokens_used(&self) -> Option<u64> {
        self.tokens_used
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        self.tool_calls.as_deref()
    }

    /// True only for a present, non-empty tool call list.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// `"stop"`, `"length"`, `"tool_calls"`, or `None` if the server omitted it.
    pub fn finish_reason(&self) -> Option<&str> {
        self.metadata.get("finish_reason").and_then(Value::as_str)
    }

    /// Flat JSON view: `{content, metadata, tokens_used, model, tool_calls}`.
    pub fn to_value(&self) -> Value {
        json!({
            "content": self.content,
            "metadata": self.metadata,
            "tokens_used": self.tokens_used,
            "model": self.model,
            "tool_calls": self.tool_calls,
        })
    }
}

impl fmt::Display for ChatResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

// ─── EmbeddingResult ─────────────────────────────────────────────────────────

/// A single embedding vector plus response metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResult {
    embedding: Vec<f32>,
    metadata: BTreeMap<String, Value>,
}

impl EmbeddingResult {
    pub fn new(embedding: Vec<f32>, metadata: BTreeMap<String, Value>) -> Self {
        Self {
            embedding,
            metadata,
        }
    }

    /// Build from a decoded `/embeddings` body using the first data entry.
    pub fn from_api(resp: EmbeddingApiResponse) -> Result<Self, LmStudioError> {
        let embedding = resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LmStudioError::InvalidResponse {
                context: "embedding".into(),
                reason: "empty data array".into(),
            })?;

        let mut metadata = BTreeMap::new();
        metadata.insert("model".to_string(), json!(resp.model));
        metadata.insert("usage".to_string(), json!(resp.usage));

        Ok(Self {
            embedding,
            metadata,
        })
    }

    pub fn vector(&self) -> &[f32] {
        &self.embedding
    }

    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn model(&self) -> Option<&str> {
        self.metadata.get("model").and_then(Value::as_str)
    }

    /// Check the vector length against an expected dimensionality.
    pub fn validate_dimensions(&self, expected: usize) -> Result<(), LmStudioError> {
        if self.embedding.len() != expected {
            return Err(LmStudioError::DimensionMismatch {
                expected,
                actual: self.embedding.len(),
            });
        }
        Ok(())
    }

    /// Cosine similarity with another vector, in `[-1, 1]`.
    ///
    /// Returns `0.0` when either vector has zero magnitude.
    pub fn cosine_similarity(&self, other: &[f32]) -> Result<f32, LmStudioError> {
        cosine_similarity(&self.embedding, other)
    }

    /// Flat JSON view: `{embedding, dimensions, metadata}`.
    pub fn to_value(&self) -> Value {
        json!({
            "embedding": self.embedding,
            "dimensions": self.dimensions(),
            "metadata": self.metadata,
        })
    }
}

/// Dot product divided by the product of magnitudes.
///
/// Fails with `DimensionMismatch` on different lengths. Accumulates in `f64`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, LmStudioError> {
    if a.len() != b.len() {
        return Err(LmStudioError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(v: Vec<f32>) -> EmbeddingResult {
        EmbeddingResult::new(v, BTreeMap::new())
    }

    #[test]
    fn test_from_completion_reads_first_choice() {
        let body = r#"{
            "id": "chatcmpl-123",
            "created": 1700000000,
            "model": "llama-3.2-3b-instruct",
            "choices": [{
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        }"#;
        let resp: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        let result = ChatResult::from_completion(resp);

        assert_eq!(result.content(), "Hello!");
        assert_eq!(result.to_string(), "Hello!");
        assert_eq!(result.tokens_used(), Some(7));
        assert_eq!(result.model(), Some("llama-3.2-3b-instruct"));
        assert_eq!(result.finish_reason(), Some("stop"));
        assert_eq!(result.metadata()["id"], "chatcmpl-123");
        assert_eq!(result.metadata()["created"], 1700000000);
        assert!(!result.has_tool_calls());
    }

    #[test]
    fn test_from_completion_empty_choices_gives_empty_content() {
        let resp: ChatCompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let result = ChatResult::from_completion(resp);
        assert_eq!(result.content(), "");
        assert!(result.finish_reason().is_none());
        assert!(result.tokens_used().is_none());
    }

    #[test]
    fn test_from_completion_with_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Cairo\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let resp: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        let result = ChatResult::from_completion(resp);
        assert!(result.has_tool_calls());
        let calls = result.tool_calls().unwrap();
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(result.finish_reason(), Some("tool_calls"));
    }

    #[test]
    fn test_has_tool_calls_false_for_empty_list() {
        let result = ChatResult::new("x", BTreeMap::new(), None, None, Some(vec![]));
        assert!(!result.has_tool_calls());
    }

    #[test]
    fn test_chat_result_to_value() {
        let result = ChatResult::new("hi", BTreeMap::new(), Some(3), Some("m".into()), None);
        let value = result.to_value();
        assert_eq!(value["content"], "hi");
        assert_eq!(value["tokens_used"], 3);
        assert_eq!(value["model"], "m");
        assert!(value["tool_calls"].is_null());
    }

    #[test]
    fn test_chat_result_survives_cache_round_trip() {
        let result = ChatResult::new("cached", BTreeMap::new(), Some(1), None, None);
        let stored = serde_json::to_value(&result).unwrap();
        let restored: ChatResult = serde_json::from_value(stored).unwrap();
        assert_eq!(restored, result);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let e = embedding(vec![0.3, -1.2, 4.5, 0.01]);
        let sim = e.cosine_similarity(e.vector()).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let e = embedding(vec![1.0, 0.0, 0.0]);
        let sim = e.cosine_similarity(&[0.0, 1.0, 0.0]).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let e = embedding(vec![1.0, 2.0]);
        let sim = e.cosine_similarity(&[-1.0, -2.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let e = embedding(vec![0.0, 0.0]);
        assert_eq!(e.cosine_similarity(&[1.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        let e = embedding(vec![1.0, 0.0, 0.0]);
        let err = e.cosine_similarity(&[1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            LmStudioError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_from_api_and_metadata() {
        let body = r#"{
            "data": [{"embedding": [0.1, 0.2, 0.3]}],
            "model": "text-embedding-nomic-embed-text-v1.5",
            "usage": {"prompt_tokens": 3, "total_tokens": 3}
        }"#;
        let resp: EmbeddingApiResponse = serde_json::from_str(body).unwrap();
        let e = EmbeddingResult::from_api(resp).unwrap();
        assert_eq!(e.dimensions(), 3);
        assert_eq!(e.model(), Some("text-embedding-nomic-embed-text-v1.5"));
        assert_eq!(e.metadata()["usage"]["total_tokens"], 3);
        assert!(e.validate_dimensions(3).is_ok());
        assert!(e.validate_dimensions(768).is_err());
        assert_eq!(e.to_value()["dimensions"], 3);
    }

    #[test]
    fn test_from_api_empty_data() {
        let resp: EmbeddingApiResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(matches!(
            EmbeddingResult::from_api(resp),
            Err(LmStudioError::InvalidResponse { .. })
        ));
    }
}
