// WebSocket stream of published snapshots

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::bus::Subscription;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Decrements the connection count on drop (connect = +1, drop = -1).
struct WsConnectionGuard(Arc<AtomicUsize>);

impl Drop for WsConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    }
}

pub(super) async fn ws_hyper(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let bus = state.bus.clone();
    let conn_count = state.ws_connections.clone();
    ws.on_upgrade(move |socket| async move {
        let subscription = bus.subscribe();
        if let Err(e) = stream_snapshots(socket, subscription, conn_count).await {
            tracing::info!("Hyper stream error: {}", e);
        }
    })
}

async fn stream_snapshots(
    mut socket: WebSocket,
    mut subscription: Subscription,
    conn_count: Arc<AtomicUsize>,
) -> anyhow::Result<()> {
    conn_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let _guard = WsConnectionGuard(conn_count);
    tracing::info!(
        replay = subscription.pending(),
        "Client connected to hyper stream"
    );

    let mut reported_dropped = 0;
    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            next = subscription.recv() => {
                let Some(snapshot) = next else { break };
                let dropped = subscription.dropped();
                if dropped > reported_dropped {
                    tracing::warn!(
                        "WebSocket /ws/hyper client lagged, skipped {} snapshots",
                        dropped - reported_dropped
                    );
                    reported_dropped = dropped;
                }
                let json = serde_json::to_string(snapshot.as_ref())?;
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
                if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}
