//! Model listing over `GET /models`.
//!
//! LM Studio has no API for loading or unloading models, so `load` and
//! `unload` always fail with `Unsupported`.

use serde::Serialize;

use crate::inference::errors::LmStudioError;
use crate::inference::types::ModelsApiResponse;
use crate::inference::LmStudioClient;

const UNSUPPORTED_LOAD: &str =
    "Model loading must be done through LM Studio UI. Please load the model manually in LM Studio.";

const UNSUPPORTED_UNLOAD: &str = "Model unloading must be done through LM Studio UI. \
                                  Please unload the model manually in LM Studio.";

/// A model advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: Option<i64>,
    pub owned_by: String,
}

pub struct ModelService<'a> {
    client: &'a LmStudioClient,
}

impl<'a> ModelService<'a> {
    pub fn new(client: &'a LmStudioClient) -> Self {
        Self { client }
    }

    /// All models the server lists, in server order.
    pub async fn list(&self) -> Result<Vec<ModelInfo>, LmStudioError> {
        let resp: ModelsApiResponse = self.client.get_json("models", "models", None).await?;

        let models: Vec<ModelInfo> = resp
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                object: m.object.unwrap_or_else(|| "model".to_string()),
                created: m.created,
                owned_by: m.owned_by.unwrap_or_else(|| "lmstudio".to_string()),
            })
            .collect();

        tracing::debug!(count = models.len(), "listed models");
        Ok(models)
    }

    /// The first listed model, which LM Studio reports as the loaded one.
    /// Any failure reads as `None`.
    pub async fn loaded(&self) -> Option<String> {
        match self.list().await {
            Ok(models) => models.into_iter().next().map(|m| m.id),
            Err(e) => {
                tracing::debug!(error = %e, "could not determine loaded model");
                None
            }
        }
    }

    pub async fn info(&self, model_id: &str) -> Result<Option<ModelInfo>, LmStudioError> {
        Ok(self.list().await?.into_iter().find(|m| m.id == model_id))
    }

    pub async fn is_available(&self, model_id: &str) -> Result<bool, LmStudioError> {
        Ok(self.info(model_id).await?.is_some())
    }

    pub async fn ids(&self) -> Result<Vec<String>, LmStudioError> {
        Ok(self.list().await?.into_iter().map(|m| m.id).collect())
    }

    pub fn load(&self, model_id: &str) -> Result<(), LmStudioError> {
        tracing::debug!(model = model_id, "programmatic model load requested");
        Err(LmStudioError::Unsupported {
            message: UNSUPPORTED_LOAD.to_string(),
        })
    }

    pub fn unload(&self) -> Result<(), LmStudioError> {
        Err(LmStudioError::Unsupported {
            message: UNSUPPORTED_UNLOAD.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::cache::MemoryCache;
    use crate::inference::config::LmStudioConfig;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(base_url: &str) -> LmStudioClient {
        let config = LmStudioConfig {
            base_url: base_url.to_string(),
            ..LmStudioConfig::default()
        };
        LmStudioClient::with_cache(config, Arc::new(MemoryCache::new())).unwrap()
    }

    async fn server_with_models() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [
                    {"id": "llama-3.2-3b-instruct", "object": "model", "created": 1700000000, "owned_by": "meta"},
                    {"id": "qwen2.5-7b"}
                ]
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_list_fills_defaults() {
        let server = server_with_models().await;
        let client = client_for(&server.uri());
        let models = client.models().list().await.unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].owned_by, "meta");
        assert_eq!(models[0].created, Some(1700000000));
        assert_eq!(
            models[1],
            ModelInfo {
                id: "qwen2.5-7b".into(),
                object: "model".into(),
                created: None,
                owned_by: "lmstudio".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_loaded_info_available_and_ids() {
        let server = server_with_models().await;
        let client = client_for(&server.uri());
        let models = client.models();

        assert_eq!(models.loaded().await.as_deref(), Some("llama-3.2-3b-instruct"));
        assert_eq!(
            models.info("qwen2.5-7b").await.unwrap().map(|m| m.id),
            Some("qwen2.5-7b".to_string())
        );
        assert!(models.info("missing").await.unwrap().is_none());
        assert!(models.is_available("qwen2.5-7b").await.unwrap());
        assert!(!models.is_available("missing").await.unwrap());
        assert_eq!(
            models.ids().await.unwrap(),
            vec!["llama-3.2-3b-instruct", "qwen2.5-7b"]
        );
    }

    #[tokio::test]
    async fn test_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        assert!(client.models().list().await.unwrap().is_empty());
        assert!(client.models().loaded().await.is_none());
    }

    #[tokio::test]
    async fn test_list_failure_and_loaded_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let err = client.models().list().await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("models"));
        assert!(client.models().loaded().await.is_none());
    }

    #[test]
    fn test_load_and_unload_are_unsupported() {
        let client = client_for("http://localhost:1234/v1");
        let models = client.models();

        let err = models.load("any").unwrap_err();
        assert!(matches!(err, LmStudioError::Unsupported { .. }));
        assert!(err.to_string().contains("LM Studio UI"));

        let err = models.unload().unwrap_err();
        assert!(err.to_string().starts_with("Model unloading must be done"));
    }
}
