use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::watch;

use crate::balancer::{ForwardError, LoadBalancer};

pub fn build_router(lb: Arc<LoadBalancer>) -> Router {
    Router::new()
        .route("/lb-stats", get(stats_handler))
        .fallback(forward_handler)
        .with_state(lb)
}

async fn stats_handler(State(lb): State<Arc<LoadBalancer>>) -> impl IntoResponse {
    Json(lb.stats_snapshot())
}

async fn forward_handler(
    State(lb): State<Arc<LoadBalancer>>,
    method: Method,
    uri: Uri,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let path_and_query = match query {
        Some(query) => format!("{}?{query}", uri.path()),
        None => uri.path().to_string(),
    };

    match lb.forward(method, &path_and_query, headers, body).await {
        Ok((status, headers, body)) => (status, headers, body).into_response(),
        Err(ForwardError::NoHealthyInstance) => {
            (StatusCode::SERVICE_UNAVAILABLE, "no healthy instances available").into_response()
        }
        Err(ForwardError::Upstream(_)) => (StatusCode::BAD_GATEWAY, "backend error").into_response(),
    }
}

/// Background health-check loop: re-checks every instance on a fixed
/// interval until `shutdown_rx` fires, matching the drain/reaper loop shape
/// used elsewhere in the system (fixed sleep raced against a watch channel).
pub async fn health_check_loop(
    lb: Arc<LoadBalancer>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        lb.run_health_checks().await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_rx.changed() => {}
        }
    }
}
