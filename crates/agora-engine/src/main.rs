//! Engine binary for the Agora simulation.
//!
//! This is the main entry point that wires together the scheduler, the LLM
//! reasoner, `PostgreSQL` write-behind sync, and the operator API. It loads
//! configuration, initializes all subsystems, and runs the simulation loop
//! until the operator requests a stop.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `agora-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and apply migrations
//! 4. Build the reasoner gateway from the environment
//! 5. Spawn the roster into a fresh simulation context
//! 6. Start the operator API server
//! 7. Run the simulation loop, then the final flush
//! 8. Stop the operator API and log the result

mod error;
mod llm_reasoner;
mod observer_callback;
mod pg_sink;

use std::path::Path;
use std::sync::Arc;

use agora_core::config::{LoggingConfig, SimulationConfig};
use agora_core::{OperatorState, Simulation, SimulationContext, SimulationHandle, runner};
use agora_db::{PostgresConfig, PostgresPool};
use agora_observer::{AppState, ServerConfig};
use agora_reasoner::{ReasonerConfig, ReasonerGateway};
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::llm_reasoner::LlmReasoner;
use crate::observer_callback::ObserverCallback;
use crate::pg_sink::PgSink;

/// Buffered operator commands before senders wait.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the simulation itself fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run().await?;
    Ok(())
}

async fn run() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("agora-engine starting");
    info!(
        world_name = config.world.name,
        seed = config.world.seed,
        tick_interval_ms = config.world.tick_interval_ms,
        agents = config.roster.len(),
        autostart = config.world.autostart,
        "Configuration loaded"
    );

    // 3. Connect to PostgreSQL.
    let postgres = PostgresPool::connect(&PostgresConfig::new(
        &config.infrastructure.postgres_url,
    ))
    .await?;
    postgres.run_migrations().await?;
    info!("PostgreSQL connected, migrations applied");

    // 4. Build the reasoner gateway.
    let reasoner_config = ReasonerConfig::from_env()?;
    let gateway = ReasonerGateway::from_config(&reasoner_config)?;
    info!(
        backend = ?reasoner_config.primary_backend.backend_type,
        model = reasoner_config.primary_backend.model,
        fallback = reasoner_config.fallback_backend.is_some(),
        call_timeout = ?reasoner_config.call_timeout,
        "Reasoner gateway ready"
    );

    // 5. Assemble the simulation.
    let server_config = ServerConfig {
        host: config.infrastructure.observer_host.clone(),
        port: config.infrastructure.observer_port,
    };
    let operator = Arc::new(OperatorState::new(
        config.world.tick_interval_ms,
        config.world.autostart,
    ));
    let ctx = SimulationContext::new(config, Utc::now())?;
    let mut sim = Simulation::new(
        ctx,
        Arc::new(LlmReasoner::new(gateway)),
        Arc::new(PgSink::new(postgres.pool().clone())),
    );

    // 6. Start the operator API server.
    let (handle, mut commands) = SimulationHandle::channel(COMMAND_CHANNEL_CAPACITY);
    let app_state = Arc::new(AppState::new(handle, Arc::clone(&operator)));
    app_state.publish(sim.snapshot()).await;
    let server_state = Arc::clone(&app_state);
    let (stop_server, server_stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _closed = server_stopped.await;
        };
        if let Err(e) = agora_observer::start_server(&server_config, server_state, shutdown).await
        {
            error!(error = %e, "Operator API server failed");
        }
    });

    // 7. Run the simulation.
    let mut callback = ObserverCallback::new(app_state);
    let outcome = runner::run_simulation(&mut sim, &operator, &mut commands, &mut callback).await;

    // 8. Stop the operator API and log results.
    if let Ok(result) = &outcome {
        runner::log_simulation_end(result);
    }
    let _server_gone = stop_server.send(());
    if let Err(e) = server.await {
        error!(error = %e, "Operator API task failed");
    }
    postgres.close().await;
    let result = outcome?;
    info!(
        total_ticks = result.total_ticks,
        "agora-engine shutdown complete"
    );
    Ok(())
}

/// Load the simulation configuration from `agora-config.yaml`.
///
/// Looks for the config file relative to the current working directory.
fn load_config() -> Result<SimulationConfig, EngineError> {
    let config_path = Path::new("agora-config.yaml");
    if config_path.exists() {
        Ok(SimulationConfig::from_file(config_path)?)
    } else {
        let mut config = SimulationConfig::default();
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_e| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
