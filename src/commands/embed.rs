//! `lmstudio embed` and `lmstudio tokens`.

use std::io::Write;

use anyhow::Result;

use crate::inference::types::EmbeddingOptions;
use crate::inference::LmStudioClient;

/// Leading vector components printed as a preview.
const PREVIEW_LEN: usize = 8;

pub async fn embed(
    client: &LmStudioClient,
    text: &str,
    model: Option<String>,
    out: &mut impl Write,
) -> Result<bool> {
    let options = EmbeddingOptions {
        model,
        ..EmbeddingOptions::default()
    };

    match client.embedding(text, &options).await {
        Ok(result) => {
            writeln!(out, "Dimensions: {}", result.dimensions())?;
            if let Some(model) = result.model() {
                writeln!(out, "Model: {model}")?;
            }
            let preview: Vec<String> = result
                .vector()
                .iter()
                .take(PREVIEW_LEN)
                .map(|v| format!("{v:.4}"))
                .collect();
            let ellipsis = if result.dimensions() > PREVIEW_LEN { ", ..." } else { "" };
            writeln!(out, "Vector: [{}{ellipsis}]", preview.join(", "))?;
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "Error: {e}")?;
            Ok(false)
        }
    }
}

/// Print the token estimate; with a limit, fail when it is exceeded.
pub fn tokens(
    client: &LmStudioClient,
    text: &str,
    limit: Option<usize>,
    out: &mut impl Write,
) -> Result<bool> {
    let count = client.count_tokens(text);
    writeln!(out, "Estimated tokens: {count}")?;

    let Some(limit) = limit else {
        return Ok(true);
    };
    let within = client.within_token_limit(text, limit);
    writeln!(
        out,
        "{} limit of {limit}",
        if within { "Within" } else { "Exceeds" }
    )?;
    Ok(within)
}
