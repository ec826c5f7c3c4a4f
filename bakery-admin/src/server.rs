use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router as AxumRouter;
use bakery_orchestrator::SliceOrchestrator;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Shared state for the Control API.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SliceOrchestrator>,
    pub host: String,
    pub port: u16,
}

/// Build the Axum router for the Control API (spec §4.4). Split out from
/// the server so tests can exercise it directly with `tower::ServiceExt::oneshot`.
pub fn build_router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .route("/v1/health", get(handlers::health::health))
        .route("/v1/status", get(handlers::health::status))
        .route("/v1/pies", get(handlers::pies::list_pies))
        .route("/v1/pies", post(handlers::pies::create_pie))
        .route("/v1/pies/{id_or_slug}", delete(handlers::pies::delete_pie))
        .route("/v1/slices", get(handlers::slices::list_slices))
        .route("/v1/slices", post(handlers::slices::create_slice))
        .route("/v1/slices/{id}/stop", post(handlers::slices::stop_slice))
        .route("/v1/slices/{id}", delete(handlers::slices::delete_slice))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the Control API until the process is asked to stop.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.host, state.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "control API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
