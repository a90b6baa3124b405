//! Operator HTTP API for the Agora simulation.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Read endpoints** for agents, live conversations, and status
//! - **Control endpoints** for start, pause, resume, speed, and stop
//! - **Command endpoints** for world events, private chat, conversation
//!   reset, and an immediate sync flush
//!
//! # Architecture
//!
//! Reads are served from an in-memory [`SimulationSnapshot`] that the
//! engine replaces as the simulation advances, so the API never blocks the
//! scheduler. Commands are forwarded over the scheduler's command channel
//! and answered once applied.
//!
//! [`SimulationSnapshot`]: agora_core::SimulationSnapshot

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
