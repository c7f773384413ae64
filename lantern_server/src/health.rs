//! Liveness endpoint.
//!
//! `GET /health` asks the actor for a report, so the counts come from the
//! same point-in-time view as everything else the actor does. A stopped
//! actor answers `503`.

use anyhow::Context;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::watch};
use tracing::info;

use crate::server::{wait_for_shutdown, ServerHandle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub player_count: usize,
    pub entity_count: usize,
    pub uptime_seconds: u64,
    /// Simulation ticks run so far, idle ones included.
    pub ticks: u64,
    /// Ticks that started more than two periods after the previous one.
    pub late_ticks: u64,
}

async fn health_check(
    State(handle): State<ServerHandle>,
) -> Result<Json<HealthReport>, StatusCode> {
    handle
        .health()
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

pub fn router(handle: ServerHandle) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(handle)
}

/// Serves the health router until `shutdown` flips to `true`.
pub async fn serve(
    listener: TcpListener,
    handle: ServerHandle,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "Health endpoint listening");
    axum::serve(listener, router(handle))
        .with_graceful_shutdown(async move { wait_for_shutdown(&mut shutdown).await })
        .await
        .context("health server")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::GameServer;
    use axum::body::Body;
    use http::Request;
    use lantern_shared::config::ServerConfig;
    use serde_json::Value;
    use tower::ServiceExt;

    fn get_health() -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_route_reports_world_counts() {
        let (server, handle) = GameServer::new(ServerConfig {
            entity_count: 4,
            seed: Some(7),
            ..Default::default()
        });
        let (stop_tx, stop_rx) = watch::channel(false);
        let actor = tokio::spawn(server.run(stop_rx));

        let resp = router(handle).oneshot(get_health()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["playerCount"], 0);
        assert_eq!(json["entityCount"], 4);
        assert!(json["uptimeSeconds"].is_u64());
        assert!(json["lateTicks"].is_u64());

        stop_tx.send(true).unwrap();
        actor.await.unwrap();
    }

    #[tokio::test]
    async fn health_route_is_unavailable_once_actor_stopped() {
        let (server, handle) = GameServer::new(ServerConfig::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let actor = tokio::spawn(server.run(stop_rx));
        stop_tx.send(true).unwrap();
        actor.await.unwrap();

        let resp = router(handle).oneshot(get_health()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (_server, handle) = GameServer::new(ServerConfig::default());
        let req = Request::builder()
            .uri("/status")
            .body(Body::empty())
            .unwrap();
        let resp = router(handle).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn report_uses_camel_case_fields() {
        let report = HealthReport {
            status: "ok".into(),
            player_count: 2,
            entity_count: 5,
            uptime_seconds: 9,
            ticks: 100,
            late_ticks: 0,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["playerCount"], 2);
        assert_eq!(json["entityCount"], 5);
        assert_eq!(json["uptimeSeconds"], 9);
    }
}
