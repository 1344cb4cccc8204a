use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(event = "taskflow.api.internal_error", error = %err, "internal error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".to_string(),
        }
    }
}

impl From<taskflow_core::Error> for ApiError {
    fn from(err: taskflow_core::Error) -> Self {
        match err {
            taskflow_core::Error::InvalidInput(msg) => Self::bad_request(msg),
            taskflow_core::Error::NotFound(msg) => Self::not_found(msg),
            taskflow_core::Error::TransitionDisallowed(msg) => Self::bad_request(msg),
            other => Self::internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(serde_json::json!({ "detail": self.message }));
        (self.status, body).into_response()
    }
}
