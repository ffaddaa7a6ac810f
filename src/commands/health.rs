//! `lmstudio test`: server status followed by a one-shot chat.

use std::io::Write;

use anyhow::Result;

use crate::inference::types::ChatOptions;
use crate::inference::LmStudioClient;
use crate::services::ServerState;

const TEST_PROMPT: &str = "Say \"Hello World\" and nothing else.";

/// Characters of the test reply echoed back.
const PREVIEW_CHARS: usize = 100;

pub async fn run(client: &LmStudioClient, out: &mut impl Write) -> Result<bool> {
    writeln!(out, "Testing connection to LM Studio...\n")?;
    writeln!(out, "Checking server status...")?;

    let status = client.health().status().await;
    if status.server != ServerState::Running {
        writeln!(out, "✗ Server is {}", status.server)?;
        if let Some(ref error) = status.error {
            writeln!(out, "  Error: {error}")?;
        }
        return Ok(false);
    }
    writeln!(out, "✓ Server is running")?;

    match status.model {
        Some(ref model) => writeln!(out, "✓ Model loaded: {model}")?,
        None => writeln!(out, "⚠ No model currently loaded")?,
    }
    writeln!(out, "✓ Available models: {}", status.available_models)?;

    writeln!(out, "\nTesting chat completion...")?;
    match client.chat(TEST_PROMPT, &ChatOptions::default()).await {
        Ok(result) => {
            let preview: String = result.content().chars().take(PREVIEW_CHARS).collect();
            writeln!(out, "✓ Chat test successful")?;
            writeln!(out, "  Response: {preview}")?;
            if let Some(tokens) = result.tokens_used() {
                writeln!(out, "  Tokens used: {tokens}")?;
            }
        }
        Err(e) => {
            writeln!(out, "✗ Chat test failed: {e}")?;
            return Ok(false);
        }
    }

    writeln!(out, "\nAll tests passed! LM Studio is working correctly.")?;
    Ok(true)
}
