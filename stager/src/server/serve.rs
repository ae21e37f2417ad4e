//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::StagerError;
use crate::server::handlers::{
    delete_droplet_handler, download_bits_handler, download_droplet_handler, health_handler,
    stage_async_handler, stage_handler, upload_droplet_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Staging API
        .route("/v1/apps/{guid}/stage", post(stage_handler))
        .route("/v1/apps/{guid}/stage_async", post(stage_async_handler))
        .route("/v1/apps/{guid}/droplet", delete(delete_droplet_handler))
        // Worker-facing artifact transfer
        .route("/staging/apps/{guid}", get(download_bits_handler))
        .route(
            "/staging/droplets/{guid}",
            get(download_droplet_handler)
                .post(upload_droplet_handler)
                .layer(DefaultBodyLimit::disable()),
        )
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), StagerError>>, StagerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| StagerError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| StagerError::ServerError(e.to_string()))
    });

    Ok(handle)
}
