use axum::{Router, http::StatusCode, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::storage::UrlRegistry;

pub mod routes;

/// Server state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn UrlRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<dyn UrlRegistry>) -> Self {
        Self { registry }
    }
}

/// Build the HTTP router over `state`. Requests running longer than
/// `request_timeout` are answered with 408.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/api/fetcher", get(routes::list_urls).post(routes::create_url))
        .route("/api/fetcher/{id}", get(routes::get_url).delete(routes::delete_url))
        .route("/api/fetcher/{id}/history", get(routes::get_history))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(
    addr: SocketAddr,
    registry: Arc<dyn UrlRegistry>,
    request_timeout: Duration,
) -> anyhow::Result<()> {
    let app = router(AppState::new(registry), request_timeout);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
