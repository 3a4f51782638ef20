// GET handlers: version, current snapshot

use axum::{extract::State, response::IntoResponse};

use super::AppState;
use crate::version::{NAME, VERSION};

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/snapshot — last published snapshot (default before the first publish).
pub(super) async fn snapshot_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.bus.current_snapshot().as_ref().clone())
}
