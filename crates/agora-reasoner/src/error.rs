//! Error types for the reasoner gateway.
//!
//! Every way a reasoning call can fail maps onto one variant here. Callers
//! never see a panic or an untyped error: transport, status, parse, and
//! schema failures all surface as a [`ReasonerError`] that the simulation
//! converts into a safe in-world default.

/// Errors that can occur while producing a reasoned answer.
#[derive(Debug, thiserror::Error)]
pub enum ReasonerError {
    /// The LLM backend was unreachable or returned a non-success status.
    #[error("LLM backend error: {0}")]
    LlmBackend(String),

    /// Failed to render a prompt template.
    #[error("template render error: {0}")]
    Template(String),

    /// The response text contained no parseable JSON.
    #[error("response parse error: {0}")]
    Parse(String),

    /// The response was JSON but did not have the expected shape.
    #[error("response schema error: {0}")]
    Schema(String),

    /// No backend answered before the deadline.
    #[error("timeout: no answer within {deadline_ms}ms")]
    Timeout {
        /// The deadline in milliseconds.
        deadline_ms: u64,
    },

    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
