//! HTTP API surface for TaskFlow: task CRUD, status transitions, health and
//! stats endpoints, backed by the blocking `QueueBackend`/`StorageBackend`
//! traits via `spawn_blocking`.

mod error;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::AppState;
