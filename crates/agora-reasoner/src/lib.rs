//! LLM reasoner gateway for the Agora simulation.
//!
//! Turns the simulation's questions (should I talk? what do I say? what do
//! I remember? how do I reply?) into prompts, sends them to an LLM over
//! HTTP, and validates the JSON answers into typed values.
//!
//! # Modules
//!
//! - [`config`] -- Environment-driven backend configuration
//! - [`error`] -- Typed failures for every stage of a call
//! - [`gateway`] -- Render, call with fallback and deadline, validate
//! - [`llm`] -- OpenAI-compatible and Anthropic HTTP backends
//! - [`parse`] -- Tolerant JSON extraction and schema validation
//! - [`prompt`] -- `minijinja` templates, built-in or loaded from disk

pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod parse;
pub mod prompt;

pub use config::{BackendType, LlmBackendConfig, ReasonerConfig};
pub use error::ReasonerError;
pub use gateway::ReasonerGateway;
pub use llm::{LlmBackend, create_backend};
pub use prompt::{PromptEngine, PromptKind, RenderedPrompt};
