//! `GET /health` for container health checks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::delivery::DeliveryTracker;
use crate::store::UpdateOffset;

#[derive(Clone)]
struct HealthState {
    started: Instant,
    tracker: Arc<DeliveryTracker>,
    offset: Arc<UpdateOffset>,
}

async fn health(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.started.elapsed().as_secs(),
        "tracked_deliveries": state.tracker.len(),
        "last_update_id": state.offset.latest(),
    }))
}

fn router(tracker: Arc<DeliveryTracker>, offset: Arc<UpdateOffset>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState {
        started: Instant::now(),
        tracker,
        offset,
    })
}

/// Serve the health endpoint until `token` is cancelled.
pub async fn serve_health(
    port: u16,
    tracker: Arc<DeliveryTracker>,
    offset: Arc<UpdateOffset>,
    token: CancellationToken,
) {
    let address = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Health endpoint could not bind {}: {}", address, e);
            return;
        }
    };

    info!("Health endpoint on http://{}/health", address);
    let shutdown = async move { token.cancelled().await };
    if let Err(e) = axum::serve(listener, router(tracker, offset))
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("Health endpoint failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;

    #[tokio::test]
    async fn test_health_reports_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path(), None);
        let tracker = Arc::new(DeliveryTracker::load(store.clone()).await);
        let offset = Arc::new(UpdateOffset::load(store).await);
        tracker.register(5, &[1, 2], chrono::Utc::now(), 1.0);
        offset.observe(77);

        let Json(body) = health(State(HealthState {
            started: Instant::now(),
            tracker,
            offset,
        }))
        .await;

        assert_eq!(body["status"], "ok");
        assert_eq!(body["tracked_deliveries"], 2);
        assert_eq!(body["last_update_id"], 77);
    }
}
