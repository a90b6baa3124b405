//! Configuration types for the reasoner gateway.
//!
//! All configuration is loaded from environment variables: which LLM
//! backends to use (with their URLs, API keys, and model names), how long a
//! single reasoning call may take, and where to find template overrides.

use std::time::Duration;

use crate::error::ReasonerError;

/// Default per-call deadline in milliseconds.
const DEFAULT_CALL_TIMEOUT_MS: u64 = 15_000;

/// Complete reasoner configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    /// Primary LLM backend configuration.
    pub primary_backend: LlmBackendConfig,
    /// Fallback LLM backend, tried once when the primary fails.
    pub fallback_backend: Option<LlmBackendConfig>,
    /// Maximum time for one reasoning call, including the fallback.
    pub call_timeout: Duration,
    /// Directory of template overrides. Built-in templates are used when
    /// unset.
    pub templates_dir: Option<String>,
}

/// Configuration for a single LLM backend.
#[derive(Debug, Clone)]
pub struct LlmBackendConfig {
    /// The backend type.
    pub backend_type: BackendType,
    /// Base API URL (e.g. `https://api.openai.com/v1`).
    pub api_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
}

/// Supported LLM backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// `OpenAI`-compatible API (works with `OpenAI`, Moonshot, `DeepSeek`, Ollama).
    OpenAi,
    /// Anthropic Messages API (different request format).
    Anthropic,
}

impl BackendType {
    /// Parse a backend name as written in the environment.
    pub fn parse(name: &str) -> Result<Self, ReasonerError> {
        match name.to_lowercase().as_str() {
            "openai" | "moonshot" | "deepseek" | "ollama" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(ReasonerError::Config(format!("unknown backend type: {other}"))),
        }
    }
}

impl ReasonerConfig {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `LLM_DEFAULT_BACKEND` -- primary backend type
    /// - `LLM_DEFAULT_API_URL` -- primary API base URL
    /// - `LLM_DEFAULT_API_KEY` -- primary API key
    /// - `LLM_DEFAULT_MODEL` -- primary model name
    ///
    /// Optional variables:
    /// - `LLM_FALLBACK_BACKEND`, `LLM_FALLBACK_API_URL`,
    ///   `LLM_FALLBACK_API_KEY`, `LLM_FALLBACK_MODEL` -- fallback backend
    /// - `LLM_CALL_TIMEOUT_MS` -- per-call deadline (default 15000)
    /// - `TEMPLATES_DIR` -- directory of prompt template overrides
    pub fn from_env() -> Result<Self, ReasonerError> {
        let primary_backend = load_backend_config("LLM_DEFAULT")?;
        let fallback_backend = load_backend_config("LLM_FALLBACK").ok();

        let call_timeout_ms: u64 = std::env::var("LLM_CALL_TIMEOUT_MS")
            .unwrap_or_else(|_| DEFAULT_CALL_TIMEOUT_MS.to_string())
            .parse()
            .map_err(|e| ReasonerError::Config(format!("invalid LLM_CALL_TIMEOUT_MS: {e}")))?;

        let templates_dir = std::env::var("TEMPLATES_DIR").ok();

        Ok(Self {
            primary_backend,
            fallback_backend,
            call_timeout: Duration::from_millis(call_timeout_ms),
            templates_dir,
        })
    }
}

/// Read a required environment variable.
fn env_var(name: &str) -> Result<String, ReasonerError> {
    std::env::var(name)
        .map_err(|e| ReasonerError::Config(format!("missing required env var {name}: {e}")))
}

/// Load an LLM backend config from a set of prefixed environment variables.
fn load_backend_config(prefix: &str) -> Result<LlmBackendConfig, ReasonerError> {
    let backend_type = BackendType::parse(&env_var(&format!("{prefix}_BACKEND"))?)?;
    let api_url = env_var(&format!("{prefix}_API_URL"))?;
    let api_key = env_var(&format!("{prefix}_API_KEY"))?;
    let model = env_var(&format!("{prefix}_MODEL"))?;

    Ok(LlmBackendConfig {
        backend_type,
        api_url,
        api_key,
        model,
    })
}
