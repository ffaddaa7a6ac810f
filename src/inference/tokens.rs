//! Token estimation.
//!
//! A character-count heuristic, not a tokenizer: most LLM tokenizers land
//! near four bytes per token for English text. Counts are approximate and
//! only suitable for rough budget checks.

use super::types::ChatMessage;

/// Average bytes per token for English prose.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text` as `ceil(len / 4)`.
///
/// Length is measured in UTF-8 bytes.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Whether the estimate for `text` fits inside `limit`.
pub fn within_limit(text: &str, limit: usize) -> bool {
    estimate_tokens(text) <= limit
}

/// Sum of content estimates across a message list.
pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(100)), 25);
        assert_eq!(estimate_tokens(&"a".repeat(101)), 26);
    }

    #[test]
    fn test_estimate_tokens_matches_ceiling_formula() {
        for n in 0..64 {
            let text = "x".repeat(n);
            let expected = (n as f64 / 4.0).ceil() as usize;
            assert_eq!(estimate_tokens(&text), expected, "length {n}");
        }
    }

    #[test]
    fn test_estimate_tokens_counts_bytes() {
        // 'é' is two bytes in UTF-8
        assert_eq!(estimate_tokens("éé"), 1);
        assert_eq!(estimate_tokens("ééé"), 2);
    }

    #[test]
    fn test_within_limit() {
        assert!(within_limit("hello", 2));
        assert!(!within_limit("hello", 1));
        assert!(within_limit("", 0));
    }

    #[test]
    fn test_estimate_messages_tokens() {
        let messages = vec![
            ChatMessage::system("You are helpful."), // 16 bytes → 4
            ChatMessage::user("hi"),                 // 2 bytes → 1
        ];
        assert_eq!(estimate_messages_tokens(&messages), 5);
    }
}
