//! In-process publish/subscribe event bus for TaskFlow, plus the built-in
//! retry and dependent-task handlers that ride on top of it.

mod bus;
mod event;
mod handlers;

pub use bus::EventBus;
pub use event::{Event, EventKind};
pub use handlers::{register_dependency_handler, register_health_check_handler, register_retry_handler};
