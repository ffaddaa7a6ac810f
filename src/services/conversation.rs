//! Multi-turn chat history bound to a client.
//!
//! Responsibilities:
//! - Keep the ordered message list for one conversation
//! - Seed (and re-seed on `clear`) the optional system prompt
//! - Send the full history on every turn and record the assistant reply

use std::fmt;

use crate::inference::errors::LmStudioError;
use crate::inference::responses::ChatResult;
use crate::inference::tokens;
use crate::inference::types::{ChatMessage, ChatOptions, Role};
use crate::inference::LmStudioClient;

/// Ordered chat history plus the options applied to every turn.
pub struct Conversation<'a> {
    client: &'a LmStudioClient,
    /// Per-turn options. `system` is kept only to re-seed the history.
    options: ChatOptions,
    messages: Vec<ChatMessage>,
}

impl<'a> Conversation<'a> {
    /// Start a conversation. If `options.system` is set it becomes the first message.
    pub fn new(client: &'a LmStudioClient, options: ChatOptions) -> Self {
        let mut conversation = Self {
            client,
            options,
            messages: Vec::new(),
        };
        conversation.seed();
        conversation
    }

    fn seed(&mut self) {
        if let Some(ref system) = self.options.system {
            self.messages.push(ChatMessage::system(system.clone()));
        }
    }

    // ─── History ─────────────────────────────────────────────────────────

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) -> &mut Self {
        self.messages.push(ChatMessage::new(role, content));
        self
    }

    pub fn user(&mut self, content: impl Into<String>) -> &mut Self {
        self.add_message(Role::User, content)
    }

    pub fn assistant(&mut self, content: impl Into<String>) -> &mut Self {
        self.add_message(Role::Assistant, content)
    }

    pub fn system(&mut self, content: impl Into<String>) -> &mut Self {
        self.add_message(Role::System, content)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Drop all messages and re-insert the seed system prompt, if any.
    pub fn clear(&mut self) -> &mut Self {
        self.messages.clear();
        self.seed();
        self
    }

    /// Estimated tokens across the whole history.
    pub fn count_tokens(&self) -> usize {
        tokens::estimate_messages_tokens(&self.messages)
    }

    // ─── Turns ───────────────────────────────────────────────────────────

    /// Options for the next request: the history as `messages`, and no
    /// `system` since the seed already sits at the head of the history.
    fn turn_options(&self) -> ChatOptions {
        ChatOptions {
            system: None,
            messages: Some(self.messages.clone()),
            ..self.options.clone()
        }
    }

    /// Send the history (plus `message`, if given) and record the reply.
    ///
    /// On failure the user message stays in the history and no assistant
    /// message is added.
    pub async fn send(&mut self, message: Option<&str>) -> Result<ChatResult, LmStudioError> {
        if let Some(text) = message {
            self.user(text);
        }

        let result = self
            .client
            .chat(message.unwrap_or_default(), &self.turn_options())
            .await?;

        self.assistant(result.content());
        Ok(result)
    }

    /// Stream a reply to `message`, forwarding each fragment to `on_chunk`.
    ///
    /// The concatenated fragments are appended as the assistant message and
    /// returned.
    pub async fn send_stream<F>(
        &mut self,
        message: &str,
        mut on_chunk: F,
    ) -> Result<String, LmStudioError>
    where
        F: FnMut(&str),
    {
        self.user(message);

        let mut full_response = String::new();
        self.client
            .stream(
                message,
                |chunk| {
                    full_response.push_str(chunk);
                    on_chunk(chunk);
                },
                &self.turn_options(),
            )
            .await?;

        self.assistant(full_response.clone());
        Ok(full_response)
    }
}

/// One `role: content` line per message.
impl fmt::Display for Conversation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, msg) in self.messages.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}: {}", msg.role, msg.content)?;
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::cache::MemoryCache;
    use crate::inference::config::LmStudioConfig;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(base_url: &str) -> LmStudioClient {
        let config = LmStudioConfig {
            base_url: base_url.to_string(),
            ..LmStudioConfig::default()
        };
        LmStudioClient::with_cache(config, Arc::new(MemoryCache::new())).unwrap()
    }

    fn reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "llama-3.2-3b-instruct",
            "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
            "usage": {"total_tokens": 5}
        }))
    }

    #[test]
    fn test_system_option_seeds_history() {
        let client = client_for("http://localhost:1234/v1");
        let conv = client.conversation(ChatOptions::new().system("Be brief."));
        assert_eq!(conv.messages(), &[ChatMessage::system("Be brief.")]);
    }

    #[test]
    fn test_no_system_option_starts_empty() {
        let client = client_for("http://localhost:1234/v1");
        let conv = client.conversation(ChatOptions::default());
        assert!(conv.messages().is_empty());
        assert!(conv.last_message().is_none());
    }

    #[test]
    fn test_clear_reseeds_system_message() {
        let client = client_for("http://localhost:1234/v1");
        let mut conv = client.conversation(ChatOptions::new().system("S"));
        conv.user("a").assistant("b").system("extra");
        assert_eq!(conv.messages().len(), 4);

        conv.clear();
        assert_eq!(conv.messages(), &[ChatMessage::system("S")]);
    }

    #[test]
    fn test_clear_without_seed_empties() {
        let client = client_for("http://localhost:1234/v1");
        let mut conv = client.conversation(ChatOptions::default());
        conv.user("a");
        conv.clear();
        assert!(conv.messages().is_empty());
    }

    #[test]
    fn test_display_and_token_count() {
        let client = client_for("http://localhost:1234/v1");
        let mut conv = client.conversation(ChatOptions::new().system("sys"));
        conv.user("hello").assistant("hi");
        assert_eq!(conv.to_string(), "system: sys\nuser: hello\nassistant: hi");
        // 3 bytes → 1, 5 → 2, 2 → 1
        assert_eq!(conv.count_tokens(), 4);
        assert_eq!(conv.last_message(), Some(&ChatMessage::assistant("hi")));
    }

    #[tokio::test]
    async fn test_send_appends_user_and_assistant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [
                    {"role": "system", "content": "S"},
                    {"role": "user", "content": "Hi"}
                ]
            })))
            .respond_with(reply("Hello!"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let mut conv = client.conversation(ChatOptions::new().system("S"));
        let result = conv.send(Some("Hi")).await.unwrap();

        assert_eq!(result.content(), "Hello!");
        assert_eq!(
            conv.messages(),
            &[
                ChatMessage::system("S"),
                ChatMessage::user("Hi"),
                ChatMessage::assistant("Hello!"),
            ]
        );
    }

    #[tokio::test]
    async fn test_send_does_not_duplicate_system_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(reply("ok"))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let mut conv = client.conversation(ChatOptions::new().system("S"));
        conv.send(Some("Hi")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
    }

    #[tokio::test]
    async fn test_send_without_message_resends_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(reply("again"))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let mut conv = client.conversation(ChatOptions::default());
        conv.user("question");
        conv.send(None).await.unwrap();

        assert_eq!(conv.messages().len(), 2);
        assert_eq!(conv.last_message().unwrap().content, "again");
    }

    #[tokio::test]
    async fn test_send_failure_keeps_user_message_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let mut conv = client.conversation(ChatOptions::default());
        assert!(conv.send(Some("Hi")).await.is_err());
        assert_eq!(conv.messages(), &[ChatMessage::user("Hi")]);
    }

    #[tokio::test]
    async fn test_send_stream_accumulates_reply() {
        let server = MockServer::start().await;
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                   data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
                   data: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let mut conv = client.conversation(ChatOptions::default());
        let mut seen = Vec::new();
        let full = conv
            .send_stream("Hi", |c| seen.push(c.to_string()))
            .await
            .unwrap();

        assert_eq!(seen, vec!["Hel", "lo"]);
        assert_eq!(full, "Hello");
        assert_eq!(conv.last_message(), Some(&ChatMessage::assistant("Hello")));
    }
}
