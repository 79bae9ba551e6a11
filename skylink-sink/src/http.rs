use std::future::Future;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use skylink_core::CombinedSnapshot;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::state::{RelayState, RelayStats};

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_secs: u64,
    pub stats: RelayStats,
    pub snapshot: CombinedSnapshot,
}

/// Health and stats endpoints.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Serve the router until `cancel` fires or `shutdown` resolves.
///
/// `cancel` is always cancelled on return, so the rest of the service stops
/// with the server even when it exits on its own.
pub async fn serve<F>(
    listener: TcpListener,
    state: RelayState,
    cancel: CancellationToken,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = cancel.clone();
    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = shutdown => {}
            }
        })
        .await;
    cancel.cancel();
    result
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn stats_handler(State(state): State<RelayState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        uptime_secs: state.uptime_secs().await,
        stats: state.stats().await,
        snapshot: state.snapshot().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::{SignedDuration, Timestamp};
    use skylink_core::SensorRecord;

    async fn serve(state: RelayState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn health_is_ok() {
        let base = serve(RelayState::new()).await;
        let body = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn stats_reflect_state() {
        let state = RelayState::new();
        state
            .ingest(
                &SensorRecord::Distance { value: 7.5 },
                Timestamp::UNIX_EPOCH,
                SignedDuration::from_secs(15),
            )
            .await;
        let base = serve(state).await;

        let stats: serde_json::Value = reqwest::get(format!("{base}/stats"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(stats["stats"]["records_applied"], 1);
        assert_eq!(stats["stats"]["publishes_attempted"], 1);
        assert_eq!(stats["snapshot"]["distance"], 7.5);
        assert!(stats["snapshot"]["ax"].is_null());
    }

    #[tokio::test]
    async fn server_exit_cancels_the_service() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();

        super::serve(listener, RelayState::new(), cancel.clone(), async {})
            .await
            .unwrap();

        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_stops_the_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(super::serve(
            listener,
            RelayState::new(),
            cancel.clone(),
            std::future::pending(),
        ));

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
