// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP trigger surface.
//!
//! Two endpoints for an external scheduler: a health check and a
//! synchronous pipeline trigger. The trigger always answers with a
//! structured [`RunResult`], never a raw error.

use crate::pipeline::{Pipeline, RunResult};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// State shared by the handlers.
pub struct AppState {
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Arc<Self> {
        Arc::new(Self { pipeline })
    }
}

/// Build the axum Router with both endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        .route("/run-pipeline", post(run_pipeline))
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn start(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
        })
        .await?;
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "scanrelay is running.",
    }))
}

/// The run executes on its own task: a client that hangs up only loses the
/// response, the run itself always finishes and tears the browser down.
async fn run_pipeline(State(state): State<Arc<AppState>>) -> (StatusCode, Json<RunResult>) {
    let run = tokio::spawn(async move { state.pipeline.run().await });
    match run.await {
        Ok(Ok(result)) => (StatusCode::OK, Json(result)),
        Ok(Err(busy)) => (StatusCode::CONFLICT, Json(RunResult::error(busy.to_string()))),
        Err(e) => {
            error!("pipeline task ended abnormally: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RunResult::error(format!("pipeline task ended abnormally: {e}"))),
            )
        }
    }
}
