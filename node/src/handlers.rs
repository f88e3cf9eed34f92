use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use common::NodeStatus;
use tower_http::trace::TraceLayer;

use crate::state::{lock, AppState};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// 200 cuando esrallyd ya arrancó; lo consulta el coordinador y la readinessProbe
async fn ready(State(state): State<AppState>) -> StatusCode {
    if *lock(&state.ready) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

// Identidad, fase actual y reporte del benchmark (si existe)
async fn status(State(state): State<AppState>) -> Json<NodeStatus> {
    Json(state.status())
}
