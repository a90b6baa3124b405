//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and simulation execution.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: agora_core::config::ConfigError,
    },

    /// The initial simulation state could not be built.
    #[error("context error: {source}")]
    Context {
        /// The underlying context error.
        #[from]
        source: agora_core::context::ContextError,
    },

    /// Simulation runner failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: agora_core::runner::RunnerError,
    },

    /// Database connection or migration failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: agora_db::DbError,
    },

    /// The reasoner gateway could not be configured.
    #[error("reasoner error: {source}")]
    Reasoner {
        /// The underlying reasoner error.
        #[from]
        source: agora_reasoner::ReasonerError,
    },
}
