//! HTTP surface.
//!
//! `GET /api/upseller` runs one invocation per request and always answers
//! 200 with the JSON envelope; `GET /health` is a liveness check.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::pipeline::KpiExtractor;

/// Shared state: immutable settings and the connector, behind the extractor.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<KpiExtractor>,
}

impl AppState {
    pub fn new(extractor: KpiExtractor) -> Self {
        Self {
            extractor: Arc::new(extractor),
        }
    }
}

/// Build the router with all routes and layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/api/upseller", get(handlers::extract::extract_kpis))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(extractor: KpiExtractor, bind: &str) -> anyhow::Result<()> {
    let app = create_router(AppState::new(extractor));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
