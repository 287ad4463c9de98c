//! Main server integration for the creative hub

use crate::models::Configuration;
use crate::server::api::create_api_routes;
use crate::server::state::AppState;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use warp::filters::BoxedFilter;
use warp::reply::Response;

/// HTTP server for the creative hub API
pub struct HubServer {
    config: Configuration,
    state: AppState,
}

impl HubServer {
    /// Create a server, building its services from `config`
    pub fn new(config: Configuration) -> Result<Self> {
        if let Err(errors) = config.validate() {
            anyhow::bail!("Invalid configuration: {}", errors.join("; "));
        }
        let state = AppState::from_config(config.clone())?;
        Ok(Self { config, state })
    }

    /// Create a server around existing services
    pub fn with_state(state: AppState) -> Self {
        Self {
            config: state.config.as_ref().clone(),
            state,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn routes(&self) -> BoxedFilter<(Response,)> {
        create_api_routes(self.state.clone())
    }

    /// Serve until Ctrl+C
    pub async fn start(self) -> Result<()> {
        let address: SocketAddr = self
            .config
            .bind_address()
            .parse()
            .context("Invalid server address")?;

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            println!("\n🛑 Shutting down server...");
        };

        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(address, shutdown)
            .context(format!("Failed to bind to {}", address))?;

        println!("🚀 creative hub server listening on http://{}", bound);
        println!("📋 Templates: {}", self.state.pipelines.templates().len());
        println!("Press Ctrl+C to stop the server");
        tracing::info!(address = %bound, "Server started");

        server.await;
        tracing::info!("Server stopped");
        Ok(())
    }
}
