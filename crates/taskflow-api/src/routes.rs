use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use taskflow_core::{Task, TaskStatus};
use taskflow_eventbus::EventKind;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:task_id", get(get_task).delete(delete_task))
        .route("/tasks/:task_id/status", put(update_task_status))
        .route("/stats", get(get_stats))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    id: Uuid,
    name: String,
    priority: i32,
    payload: HashMap<String, Value>,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            name: task.name,
            priority: task.priority,
            payload: task.payload,
            status: task.status,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    queue_size: usize,
    worker_running: bool,
}

async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    let queue = state.queue.clone();
    let queue_size = tokio::task::spawn_blocking(move || queue.size())
        .await
        .map_err(ApiError::internal)??;

    Ok(Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        queue_size,
        worker_running: state.worker_running.load(Ordering::SeqCst),
    }))
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    name: String,
    priority: i32,
    #[serde(default)]
    payload: HashMap<String, Value>,
    #[serde(default)]
    max_retries: Option<u32>,
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskResponse>)> {
    let queue = state.queue.clone();
    let (name, priority, payload, max_retries) =
        (req.name, req.priority, req.payload, req.max_retries);
    let id = tokio::task::spawn_blocking({
        let (name, payload) = (name.clone(), payload.clone());
        move || queue.enqueue(name, priority, payload, None, max_retries)
    })
    .await
    .map_err(ApiError::internal)??;

    let queue = state.queue.clone();
    let task = tokio::task::spawn_blocking(move || queue.get_task(id))
        .await
        .map_err(ApiError::internal)??
        .ok_or_else(|| ApiError::internal("task vanished immediately after creation"))?;

    let mut event_payload = HashMap::new();
    event_payload.insert("task_id".to_string(), json!(task.id));
    event_payload.insert("name".to_string(), json!(task.name));
    state
        .event_bus
        .publish(EventKind::TaskCreated, event_payload, "api", None);

    tracing::info!(event = "taskflow.api.task_created", task_id = %task.id, "task created via api");
    Ok((StatusCode::CREATED, Json(task.into())))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskResponse>> {
    let queue = state.queue.clone();
    let task = tokio::task::spawn_blocking(move || queue.get_task(task_id))
        .await
        .map_err(ApiError::internal)??
        .ok_or_else(|| ApiError::not_found("task not found"))?;
    Ok(Json(task.into()))
}

#[derive(Debug, Deserialize)]
struct TaskStatusUpdateRequest {
    status: String,
}

async fn update_task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<TaskStatusUpdateRequest>,
) -> ApiResult<Json<Value>> {
    let status = TaskStatus::parse(&req.status)
        .ok_or_else(|| ApiError::bad_request(format!("invalid status: {}", req.status)))?;

    let queue = state.queue.clone();
    let updated = tokio::task::spawn_blocking(move || queue.update_task_status(task_id, status))
        .await
        .map_err(ApiError::internal)??;

    if !updated {
        return Err(ApiError::not_found("task not found"));
    }

    Ok(Json(json!({ "message": "task status updated successfully" })))
}

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<TaskResponse>>> {
    let limit = query.limit.unwrap_or(100);
    let queue = state.queue.clone();

    let tasks = match query.status {
        Some(status_str) => {
            let status = TaskStatus::parse(&status_str)
                .ok_or_else(|| ApiError::bad_request(format!("invalid status: {status_str}")))?;
            tokio::task::spawn_blocking(move || queue.get_tasks_by_status(status))
                .await
                .map_err(ApiError::internal)??
        }
        None => tokio::task::spawn_blocking(move || queue.get_all_tasks())
            .await
            .map_err(ApiError::internal)??,
    };

    let tasks = tasks.into_iter().take(limit).map(TaskResponse::from).collect();
    Ok(Json(tasks))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let queue = state.queue.clone();
    let (size, pending, processing, completed, failed) = tokio::task::spawn_blocking(move || {
        let size = queue.size()?;
        let pending = queue.get_tasks_by_status(TaskStatus::Pending)?.len();
        let processing = queue.get_tasks_by_status(TaskStatus::Processing)?.len();
        let completed = queue.get_tasks_by_status(TaskStatus::Completed)?.len();
        let failed = queue.get_tasks_by_status(TaskStatus::Failed)?.len();
        taskflow_core::Result::Ok((size, pending, processing, completed, failed))
    })
    .await
    .map_err(ApiError::internal)??;

    Ok(Json(json!({
        "queue_size": size,
        "worker_running": state.worker_running.load(Ordering::SeqCst),
        "task_counts": {
            "pending": pending,
            "processing": processing,
            "completed": completed,
            "failed": failed,
        }
    })))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let queue = state.queue.clone();
    let existed = tokio::task::spawn_blocking(move || queue.get_task(task_id))
        .await
        .map_err(ApiError::internal)??
        .is_some();
    if !existed {
        return Err(ApiError::not_found("task not found"));
    }

    let queue = state.queue.clone();
    tokio::task::spawn_blocking(move || queue.delete_task(task_id))
        .await
        .map_err(ApiError::internal)??;

    let storage = state.storage.clone();
    tokio::task::spawn_blocking(move || storage.delete_task(task_id))
        .await
        .map_err(ApiError::internal)??;

    tracing::info!(event = "taskflow.api.task_deleted", task_id = %task_id, "task deleted via api");
    Ok(Json(json!({ "message": "task deleted successfully" })))
}
