//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::SimConfig;
use crate::fleet::FleetStore;

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: SimConfig,
    pub store: Arc<FleetStore>,
}

/// Read-only HTTP surface over the fleet store.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: SimConfig, store: Arc<FleetStore>) -> Self {
        Self {
            state: AppState { config, store },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/", get(handlers::handle_index))
            .route("/api/dashboard", get(handlers::handle_dashboard))
            // Inventory & metrics
            .route("/api/servers", get(handlers::handle_get_servers))
            .route("/api/servers/{id}/metrics", get(handlers::handle_get_server_metrics))
            .route("/api/metrics", get(handlers::handle_get_metrics))
            .route("/api/clusters", get(handlers::handle_get_clusters))
            // Lifecycle
            .route("/api/tasks", get(handlers::handle_get_tasks))
            .route("/api/tasks/{id}", get(handlers::handle_get_task))
            .route("/api/alerts", get(handlers::handle_get_alerts))
            // Aggregates
            .route("/api/system-health", get(handlers::handle_get_health))
            .route("/api/load-balance", get(handlers::handle_get_load_balance))
            .route("/api/timeseries", get(handlers::handle_get_time_series))
            .route(
                "/api/timeseries/summary",
                get(handlers::handle_get_time_series_summary),
            )
            .route("/api/grouped", get(handlers::handle_get_grouped))
            .route("/api/stats", get(handlers::handle_get_stats))
            .route("/api/search", get(handlers::handle_search))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
