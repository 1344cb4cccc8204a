use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug)]
pub struct InstanceState {
    pub status: InstanceStatus,
    pub last_check: Option<Instant>,
    pub response_time_ms: f64,
    pub error_count: u32,
}

impl Default for InstanceState {
    fn default() -> Self {
        Self {
            status: InstanceStatus::Unknown,
            last_check: None,
            response_time_ms: 0.0,
            error_count: 0,
        }
    }
}

/// One backend server the load balancer forwards requests to. `state` is
/// mutated by the health-check loop and read by the round-robin cursor and
/// the stats endpoint, so it lives behind its own lock rather than the
/// balancer's.
pub struct Instance {
    pub host: String,
    pub port: u16,
    pub state: Mutex<InstanceState>,
}

impl Instance {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            state: Mutex::new(InstanceState::default()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state.lock().expect("instance state poisoned").status == InstanceStatus::Healthy
    }
}
