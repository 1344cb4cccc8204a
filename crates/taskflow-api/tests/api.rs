use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use taskflow_api::{build_router, AppState};
use taskflow_eventbus::EventBus;
use taskflow_queue::InMemoryQueue;
use taskflow_storage::LocalFsStorage;
use tower::ServiceExt;

fn test_app() -> (axum::Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(AppState {
        queue: Arc::new(InMemoryQueue::new()),
        storage: Arc::new(LocalFsStorage::new(dir.path()).unwrap()),
        event_bus: Arc::new(EventBus::new()),
        worker_running: Arc::new(AtomicBool::new(true)),
    });
    (build_router(state), dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_reports_queue_size_and_worker_state() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["worker_running"], true);
    assert_eq!(body["queue_size"], 0);
}

#[tokio::test]
async fn create_then_get_task_round_trips() {
    let (app, _dir) = test_app();
    let create = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": "A", "priority": 2, "payload": {}}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap();
    assert_eq!(created["status"], "pending");

    let get = Request::builder()
        .uri(format!("/tasks/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(get).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["id"], created["id"]);
    assert_eq!(fetched["name"], "A");
}

#[tokio::test]
async fn get_unknown_task_returns_404() {
    let (app, _dir) = test_app();
    let request = Request::builder()
        .uri(format!("/tasks/{}", uuid::Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_status_update_returns_400() {
    let (app, _dir) = test_app();
    let create = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header("content-type", "application/json")
        .body(Body::from(json!({"name": "A", "priority": 1}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap();

    let update = Request::builder()
        .method("PUT")
        .uri(format!("/tasks/{id}/status"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"status": "bogus"}).to_string()))
        .unwrap();
    let response = app.oneshot(update).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_then_get_returns_404() {
    let (app, _dir) = test_app();
    let create = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header("content-type", "application/json")
        .body(Body::from(json!({"name": "A", "priority": 1}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/tasks/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let get = Request::builder()
        .uri(format!("/tasks/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(get).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_tasks_filters_by_status() {
    let (app, _dir) = test_app();
    for name in ["A", "B"] {
        let create = Request::builder()
            .method("POST")
            .uri("/tasks")
            .header("content-type", "application/json")
            .body(Body::from(json!({"name": name, "priority": 1}).to_string()))
            .unwrap();
        app.clone().oneshot(create).await.unwrap();
    }

    let list = Request::builder()
        .uri("/tasks?status=pending")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(list).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}
