//! `lmstudio models` and `lmstudio load`.

use std::io::Write;

use anyhow::Result;

use crate::inference::LmStudioClient;

/// Print the model table and the currently loaded model.
pub async fn list(client: &LmStudioClient, out: &mut impl Write) -> Result<bool> {
    writeln!(out, "Fetching models from LM Studio...")?;

    let models = match client.models().list().await {
        Ok(models) => models,
        Err(e) => {
            writeln!(out, "Error: {e}")?;
            return Ok(false);
        }
    };

    if models.is_empty() {
        writeln!(
            out,
            "No models found. Make sure LM Studio is running and has models loaded."
        )?;
        return Ok(false);
    }

    let id_width = models.iter().map(|m| m.id.len()).max().unwrap_or(0).max(2);
    writeln!(out, "Available Models:\n")?;
    writeln!(out, "{:<id_width$}  {:<8}  Owner", "ID", "Type")?;
    for model in &models {
        writeln!(out, "{:<id_width$}  {:<8}  {}", model.id, model.object, model.owned_by)?;
    }

    if let Some(loaded) = models.first() {
        writeln!(out, "\nCurrently loaded: {}", loaded.id)?;
    }
    Ok(true)
}

/// Check that `model_id` is listed, then report that loading is UI-only.
///
/// Never succeeds: the server has no load endpoint.
pub async fn load(client: &LmStudioClient, model_id: &str, out: &mut impl Write) -> Result<bool> {
    writeln!(out, "Attempting to load model: {model_id}\n")?;
    let models = client.models();

    match models.is_available(model_id).await {
        Ok(true) => {}
        Ok(false) => {
            writeln!(out, "Model '{model_id}' is not available.\n")?;
            writeln!(out, "Available models:")?;
            for id in models.ids().await.unwrap_or_default() {
                writeln!(out, "  - {id}")?;
            }
            return Ok(false);
        }
        Err(e) => {
            writeln!(out, "Error: {e}")?;
            return Ok(false);
        }
    }

    match models.load(model_id) {
        Ok(()) => {
            writeln!(out, "Model '{model_id}' loaded successfully!")?;
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "{e}\n")?;
            writeln!(
                out,
                "Note: Model loading must currently be done through the LM Studio UI."
            )?;
            Ok(false)
        }
    }
}
