//! Server health checks.
//!
//! A probe is `GET /models` with a short timeout. `is_healthy` caches the
//! probe outcome in the client's cache store for `health.cache_ttl`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::inference::errors::LmStudioError;
use crate::inference::types::ModelsApiResponse;
use crate::inference::LmStudioClient;

/// Cache key for the last probe result.
pub const HEALTH_CACHE_KEY: &str = "lmstudio:health:status";

/// Per-probe request timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Coarse server state reported by `status()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Running,
    Offline,
    Unknown,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServerState::Running => "running",
            ServerState::Offline => "offline",
            ServerState::Unknown => "unknown",
        })
    }
}

/// Snapshot returned by `HealthService::status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub server: ServerState,
    /// First listed model, if any.
    pub model: Option<String>,
    pub available_models: usize,
    /// RFC 3339 time of the check.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct HealthService<'a> {
    client: &'a LmStudioClient,
}

impl<'a> HealthService<'a> {
    pub fn new(client: &'a LmStudioClient) -> Self {
        Self { client }
    }

    /// Whether the server answers `GET /models` with 200.
    ///
    /// Always `true` when health checks are disabled. Cache failures fall
    /// through to a live probe.
    pub async fn is_healthy(&self) -> bool {
        let health = &self.client.config().health;
        if !health.enabled {
            return true;
        }

        let cache = self.client.cache();
        match cache.get(HEALTH_CACHE_KEY) {
            Ok(Some(Value::Bool(healthy))) => return healthy,
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "health cache read failed"),
        }

        let healthy = self.client.probe("models", PROBE_TIMEOUT).await;
        if let Err(e) = cache.put(
            HEALTH_CACHE_KEY,
            Value::Bool(healthy),
            self.client.config().health_cache_ttl(),
        ) {
            tracing::warn!(error = %e, "health cache write failed");
        }

        tracing::debug!(healthy, "health probe");
        healthy
    }

    /// Live (uncached) status check.
    ///
    /// Transport and HTTP failures report `offline` with the error; a 200
    /// whose body cannot be decoded reports `unknown`.
    pub async fn status(&self) -> HealthStatus {
        let mut status = HealthStatus {
            server: ServerState::Unknown,
            model: None,
            available_models: 0,
            timestamp: chrono::Utc::now().to_rfc3339(),
            error: None,
        };

        let fetched: Result<ModelsApiResponse, LmStudioError> = self
            .client
            .get_json("health", "models", Some(PROBE_TIMEOUT))
            .await;
        match fetched {
            Ok(resp) => {
                status.server = ServerState::Running;
                status.model = resp.data.first().map(|m| m.id.clone());
                status.available_models = resp.data.len();
            }
            Err(e) if e.is_transport() => {
                status.server = ServerState::Offline;
                status.error = Some(e.to_string());
            }
            Err(e) => {
                status.error = Some(e.to_string());
            }
        }

        status
    }

    pub async fn ping(&self) -> bool {
        self.is_healthy().await
    }

    /// LM Studio does not report uptime.
    pub fn uptime(&self) -> Option<u64> {
        None
    }

    /// Forget the cached probe result so the next check hits the server.
    pub fn clear_cache(&self) -> Result<(), LmStudioError> {
        self.client.cache().forget(HEALTH_CACHE_KEY)
    }
}
