//! Client configuration loading and validation.
//!
//! Configuration is an immutable snapshot built once, either from
//! `LMSTUDIO_*` environment variables or from a YAML file whose string
//! values may reference environment variables. The client and every
//! collaborator receive it explicitly.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::LmStudioError;

// ─── Defaults ────────────────────────────────────────────────────────────────

const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MODEL: &str = "llama-3.2-3b-instruct";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-nomic-embed-text-v1.5";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level client configuration (mirrors the YAML layout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmStudioConfig {
    /// OpenAI-compatible API root, e.g. `http://localhost:1234/v1`.
    pub base_url: String,
    /// Request timeout in seconds. Local models can be slow.
    pub timeout: u64,
    pub default_model: String,
    pub defaults: SamplingDefaults,
    pub streaming: StreamingConfig,
    pub embeddings: EmbeddingsConfig,
    pub health: HealthConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
}

/// Default sampling parameters for chat completions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingDefaults {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub enabled: bool,
    /// Initial capacity of the line buffer used while reading a stream.
    pub chunk_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub model: String,
    /// Expected vector length. Responses of any other length are rejected.
    pub dimensions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    /// How long a health probe result is cached, in seconds.
    pub cache_ttl: u64,
}

/// Retry settings.
///
/// Accepted and exposed for callers that build their own retry policy.
/// The client itself never retries a request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    /// Delay between attempts, in milliseconds.
    pub delay: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Recorded as the `channel` field on every client log event.
    pub channel: String,
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDriver {
    /// One JSON file per entry under the platform cache directory.
    File,
    /// Process-local map; lost on exit.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Lifetime of cached chat/embedding results, in seconds.
    pub ttl: u64,
    pub driver: CacheDriver,
}

// ─── Default impls ───────────────────────────────────────────────────────────

impl Default for LmStudioConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            default_model: DEFAULT_MODEL.to_string(),
            defaults: SamplingDefaults::default(),
            streaming: StreamingConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            health: HealthConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for SamplingDefaults {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
            top_p: 0.9,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: 1024,
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl: 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            delay: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: "stack".to_string(),
            level: "debug".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: 3600,
            driver: CacheDriver::File,
        }
    }
}

// ─── Accessors ───────────────────────────────────────────────────────────────

impl LmStudioConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Cached chat/embedding lifetime as a `Duration`.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl)
    }

    /// Health probe cache lifetime as a `Duration`.
    pub fn health_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.health.cache_ttl)
    }

    /// Base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Reject values the client cannot work with.
    pub fn validate(&self) -> Result<(), LmStudioError> {
        if self.base_url.trim().is_empty() {
            return Err(LmStudioError::Config {
                reason: "base_url must not be empty".into(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(LmStudioError::Config {
                reason: format!("base_url must be an http(s) URL, got '{}'", self.base_url),
            });
        }
        if self.timeout == 0 {
            return Err(LmStudioError::Config {
                reason: "timeout must be greater than zero".into(),
            });
        }
        if self.embeddings.dimensions == 0 {
            return Err(LmStudioError::Config {
                reason: "embeddings.dimensions must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl LmStudioConfig {
    /// Build a configuration from `LMSTUDIO_*` environment variables.
    ///
    /// Missing or unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Keys are the full variable names, e.g. `LMSTUDIO_BASE_URL`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);
        let flag = |key: &str, default: bool| {
            lookup(key).and_then(|v| parse_bool(&v)).unwrap_or(default)
        };

        Self {
            base_url: string("LMSTUDIO_BASE_URL", d.base_url),
            timeout: parse_setting(&lookup, "LMSTUDIO_TIMEOUT").unwrap_or(d.timeout),
            default_model: string("LMSTUDIO_DEFAULT_MODEL", d.default_model),
            defaults: SamplingDefaults {
                max_tokens: parse_setting(&lookup, "LMSTUDIO_MAX_TOKENS")
                    .unwrap_or(d.defaults.max_tokens),
                temperature: parse_setting(&lookup, "LMSTUDIO_TEMPERATURE")
                    .unwrap_or(d.defaults.temperature),
                top_p: parse_setting(&lookup, "LMSTUDIO_TOP_P").unwrap_or(d.defaults.top_p),
                frequency_penalty: parse_setting(&lookup, "LMSTUDIO_FREQUENCY_PENALTY")
                    .unwrap_or(d.defaults.frequency_penalty),
                presence_penalty: parse_setting(&lookup, "LMSTUDIO_PRESENCE_PENALTY")
                    .unwrap_or(d.defaults.presence_penalty),
            },
            streaming: StreamingConfig {
                enabled: flag("LMSTUDIO_STREAMING_ENABLED", d.streaming.enabled),
                chunk_size: parse_setting(&lookup, "LMSTUDIO_STREAMING_CHUNK_SIZE")
                    .unwrap_or(d.streaming.chunk_size),
            },
            embeddings: EmbeddingsConfig {
                model: string("LMSTUDIO_EMBEDDING_MODEL", d.embeddings.model),
                dimensions: parse_setting(&lookup, "LMSTUDIO_EMBEDDING_DIMENSIONS")
                    .unwrap_or(d.embeddings.dimensions),
            },
            health: HealthConfig {
                enabled: flag("LMSTUDIO_HEALTH_ENABLED", d.health.enabled),
                cache_ttl: parse_setting(&lookup, "LMSTUDIO_HEALTH_CACHE_TTL")
                    .unwrap_or(d.health.cache_ttl),
            },
            retry: RetryConfig {
                enabled: flag("LMSTUDIO_RETRY_ENABLED", d.retry.enabled),
                max_attempts: parse_setting(&lookup, "LMSTUDIO_RETRY_MAX_ATTEMPTS")
                    .unwrap_or(d.retry.max_attempts),
                delay: parse_setting(&lookup, "LMSTUDIO_RETRY_DELAY").unwrap_or(d.retry.delay),
            },
            logging: LoggingConfig {
                enabled: flag("LMSTUDIO_LOGGING_ENABLED", d.logging.enabled),
                channel: string("LMSTUDIO_LOGGING_CHANNEL", d.logging.channel),
                level: string("LMSTUDIO_LOGGING_LEVEL", d.logging.level),
            },
            cache: CacheConfig {
                enabled: flag("LMSTUDIO_CACHE_ENABLED", d.cache.enabled),
                ttl: parse_setting(&lookup, "LMSTUDIO_CACHE_TTL").unwrap_or(d.cache.ttl),
                driver: lookup("LMSTUDIO_CACHE_DRIVER")
                    .and_then(|v| parse_driver(&v))
                    .unwrap_or(d.cache.driver),
            },
        }
    }

    /// Load and parse a YAML configuration file.
    ///
    /// Performs environment-variable interpolation on string values matching
    /// `${VAR_NAME}` or `${VAR_NAME:-default}`. Omitted keys take defaults.
    pub fn load(path: &Path) -> Result<Self, LmStudioError> {
        let raw = std::fs::read_to_string(path).map_err(|e| LmStudioError::Config {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse a YAML document (after env interpolation) into a config.
    pub fn from_yaml_str(raw: &str) -> Result<Self, LmStudioError> {
        let interpolated = interpolate_env_vars(raw);

        let config: LmStudioConfig =
            serde_yaml::from_str(&interpolated).map_err(|e| LmStudioError::Config {
                reason: format!("failed to parse config: {e}"),
            })?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse `key` as the target type. Negative, fractional, or out-of-range
/// values for integer settings read as absent.
fn parse_setting<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn parse_driver(raw: &str) -> Option<CacheDriver> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "file" => Some(CacheDriver::File),
        "memory" | "array" => Some(CacheDriver::Memory),
        _ => None,
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute `${VAR}` and `${VAR:-fallback}` references.
///
/// An unset `VAR` with no fallback becomes the empty string. A `${` with
/// no closing brace is left untouched.
fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        let Some(close) = rest[open + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(&lookup_reference(&rest[open + 2..open + 2 + close]));
        rest = &rest[open + 2 + close + 1..];
    }

    out.push_str(rest);
    out
}

/// Value for the body of one `${...}` reference.
fn lookup_reference(reference: &str) -> String {
    let (name, fallback) = match reference.split_once(":-") {
        Some((name, fallback)) => (name, Some(fallback)),
        None => (reference, None),
    };
    match (std::env::var(name), fallback) {
        (Ok(value), _) => value,
        (Err(_), Some(fallback)) => expand_tilde(fallback),
        (Err(_), None) => String::new(),
    }
}

/// Replace a leading `~` or `~/` with the home directory.
pub fn expand_tilde(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{rest}", home.display()),
        None => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
