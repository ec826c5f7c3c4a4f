use std::net::SocketAddr;

use axum::routing::any;
use axum::Router as AxumRouter;
use bakery_store::Store;
use tower_http::trace::TraceLayer;

use crate::handler::proxy;

/// Shared state for the router proxy.
#[derive(Clone)]
pub struct ProxyState {
    pub store: Store,
    pub http_client: reqwest::Client,
}

impl ProxyState {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            http_client: reqwest::Client::new(),
        }
    }
}

/// Build the proxy's router: one fallback handler for every host and path,
/// exposed as a free function so tests can exercise it directly with
/// `tower::ServiceExt::oneshot`.
pub fn build_router(state: ProxyState) -> AxumRouter {
    AxumRouter::new()
        .fallback(any(proxy))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the first candidate port that is free, falling back to an
/// OS-assigned port (0) if every candidate is taken (spec §4.4 startup
/// behavior). Returns the bound listener and the resolved port.
pub async fn bind_first_free(candidates: &[u16]) -> std::io::Result<(tokio::net::TcpListener, u16)> {
    for &port in candidates {
        if let Ok(listener) = tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
            let bound = listener.local_addr()?.port();
            return Ok((listener, bound));
        }
    }
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", 0)).await?;
    let bound = listener.local_addr()?.port();
    Ok((listener, bound))
}

/// Serves the router proxy on an already-bound listener until the process
/// is asked to stop.
pub async fn serve(listener: tokio::net::TcpListener, state: ProxyState) -> anyhow::Result<()> {
    let app = build_router(state);
    tracing::info!(addr = %listener.local_addr()?, "router proxy listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
