//! Operator HTTP server lifecycle.
//!
//! [`start_server`] binds, serves the router, and returns once the given
//! shutdown future resolves and in-flight requests have drained. The engine
//! resolves it after the final sync flush, so the last snapshot stays
//! readable until the process exits.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Where the operator API listens.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0`.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// The socket address described by `host` and `port`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if `host` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ServerError::Bind(format!("invalid address {}: {e}", self.host)))
    }
}

/// Serve the operator API until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is invalid or taken, and
/// [`ServerError::Serve`] on a fatal I/O error while serving.
pub async fn start_server<F>(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;
    info!(%addr, "Operator API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    info!("Operator API stopped");
    Ok(())
}

/// Errors from starting or running the operator server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address is invalid or could not be bound.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server hit a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}
