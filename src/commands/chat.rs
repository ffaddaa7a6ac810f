//! `lmstudio chat`: send one message, optionally streaming the reply.

use std::io::Write;

use anyhow::Result;

use crate::inference::types::ChatOptions;
use crate::inference::LmStudioClient;

/// Arguments for a single chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatArgs {
    pub message: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl ChatArgs {
    fn options(&self) -> ChatOptions {
        ChatOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..ChatOptions::default()
        }
    }
}

pub async fn run(client: &LmStudioClient, args: &ChatArgs, out: &mut impl Write) -> Result<bool> {
    let options = args.options();

    if args.stream {
        writeln!(out, "Streaming response:\n")?;
        let mut write_err = None;
        let streamed = client
            .stream(
                &args.message,
                |chunk| {
                    if write_err.is_none() {
                        if let Err(e) = write!(out, "{chunk}").and_then(|_| out.flush()) {
                            write_err = Some(e);
                        }
                    }
                },
                &options,
            )
            .await;
        if let Some(e) = write_err {
            return Err(e.into());
        }
        writeln!(out)?;

        return match streamed {
            Ok(()) => Ok(true),
            Err(e) => {
                writeln!(out, "Error: {e}")?;
                Ok(false)
            }
        };
    }

    writeln!(out, "Sending message...\n")?;
    match client.chat(&args.message, &options).await {
        Ok(result) => {
            writeln!(out, "{}\n", result.content())?;
            if let Some(tokens) = result.tokens_used() {
                writeln!(out, "Tokens used: {tokens}")?;
            }
            if let Some(model) = result.model() {
                writeln!(out, "Model: {model}")?;
            }
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "Error: {e}")?;
            Ok(false)
        }
    }
}
