//! HTTP surface
//!
//! Thin axum handlers over [`SyncEngine`]. Errors leave as 4xx/5xx with an
//! `{errorCode, errorMessage}` body.

pub mod error;
pub mod handlers;

pub use error::ApiError;

use crate::core::engine::SyncEngine;
use crate::domain::{BridgeError, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
}

pub fn router(engine: Arc<SyncEngine>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route(
            "/encounters/:hospital_id/:registration_id",
            get(handlers::get_encounter).post(handlers::post_encounter),
        )
        .route(
            "/encounters/:hospital_id/:registration_id/items/:category",
            get(handlers::list_items).post(handlers::post_items),
        )
        .route(
            "/encounters/:hospital_id/:registration_id/vital-signs",
            post(handlers::post_vital_signs),
        )
        .route("/reconcile/:sweep", post(handlers::reconcile))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

/// Serves until the shutdown receiver reads `true`
pub async fn serve(
    listener: TcpListener,
    engine: Arc<SyncEngine>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| BridgeError::Io(e.to_string()))?;
    tracing::info!(address = %addr, "HTTP server listening");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            tracing::info!("HTTP server shutting down");
        })
        .await
        .map_err(|e| BridgeError::Io(e.to_string()))
}
