// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tower_http::cors::{Any, CorsLayer};

use crate::bus::SnapshotBus;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) bus: SnapshotBus,
    pub(crate) ws_connections: Arc<AtomicUsize>,
}

pub fn app(bus: SnapshotBus, ws_connections: Arc<AtomicUsize>) -> Router {
    let state = AppState {
        bus,
        ws_connections,
    };
    Router::new()
        .route("/", get(|| async { "hyperstats: telemetry hub is up" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/snapshot", get(http::snapshot_handler)) // GET /api/snapshot
        .route("/ws/hyper", get(ws::ws_hyper)) // WS /ws/hyper
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
