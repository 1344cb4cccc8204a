use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use serde_json::{json, Value};

use crate::instance::{Instance, InstanceStatus};

#[derive(Debug)]
pub enum ForwardError {
    NoHealthyInstance,
    Upstream(reqwest::Error),
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHealthyInstance => write!(f, "no healthy instances available"),
            Self::Upstream(err) => write!(f, "backend error: {err}"),
        }
    }
}

#[derive(Default)]
struct Stats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    avg_response_time_ms: f64,
}

/// Drops the headers that must not be blindly forwarded to the upstream:
/// `host` (belongs to the LB, not the backend), `connection` (hop-by-hop),
/// and `content-length`/`transfer-encoding` (reqwest recomputes these from
/// the body it's given; forwarding stale values can desync the backend's
/// framing from the actual bytes sent).
fn strip_hop_by_hop_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut upstream_headers = reqwest::header::HeaderMap::new();
    for (name, value) in headers.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if lower == "host"
            || lower == "connection"
            || lower == "content-length"
            || lower == "transfer-encoding"
        {
            continue;
        }
        upstream_headers.insert(name.clone(), value.clone());
    }
    upstream_headers
}

/// Health-checked round-robin reverse proxy over a fixed set of backend
/// instances, ported from an `aiohttp` load balancer to `axum` + `reqwest`.
pub struct LoadBalancer {
    instances: Vec<Arc<Instance>>,
    client: reqwest::Client,
    scheme: String,
    cursor: AtomicUsize,
    stats: Mutex<Stats>,
}

impl LoadBalancer {
    /// `scheme` is the URL scheme prefix (e.g. `"http://"`); each backend
    /// carries its own host, unlike the single shared `base_url` the
    /// reference implementation assumed.
    pub fn new(scheme: impl Into<String>, backends: Vec<(String, u16)>) -> Self {
        let instances = backends
            .into_iter()
            .map(|(host, port)| Arc::new(Instance::new(host, port)))
            .collect();
        Self {
            instances,
            client: reqwest::Client::new(),
            scheme: scheme.into(),
            cursor: AtomicUsize::new(0),
            stats: Mutex::new(Stats::default()),
        }
    }

    pub async fn check_instance_health(&self, instance: &Instance) -> bool {
        let url = format!("{}{}:{}/health", self.scheme, instance.host, instance.port);
        let start = Instant::now();

        match self.client.get(&url).send().await {
            Ok(response) => {
                let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;
                let mut state = instance.state.lock().expect("instance state poisoned");
                state.last_check = Some(Instant::now());
                state.response_time_ms = response_time_ms;
                if response.status().is_success() {
                    state.status = InstanceStatus::Healthy;
                    state.error_count = 0;
                    true
                } else {
                    state.status = InstanceStatus::Unhealthy;
                    state.error_count += 1;
                    false
                }
            }
            Err(err) => {
                tracing::warn!(
                    event = "taskflow.lb.health_check_failed",
                    host = %instance.host,
                    port = instance.port,
                    error = %err,
                    "health check failed"
                );
                let mut state = instance.state.lock().expect("instance state poisoned");
                state.status = InstanceStatus::Unhealthy;
                state.error_count += 1;
                state.last_check = Some(Instant::now());
                false
            }
        }
    }

    pub async fn run_health_checks(&self) {
        for instance in &self.instances {
            self.check_instance_health(instance).await;
        }
    }

    fn healthy_instances(&self) -> Vec<Arc<Instance>> {
        self.instances
            .iter()
            .filter(|i| i.is_healthy())
            .cloned()
            .collect()
    }

    /// Round-robins strictly over the currently-healthy subset; unhealthy
    /// instances drop out without leaving a gap in the cycle.
    pub fn next_instance(&self) -> Option<Arc<Instance>> {
        let healthy = self.healthy_instances();
        if healthy.is_empty() {
            tracing::warn!(event = "taskflow.lb.no_healthy_instances", "no healthy instances available");
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % healthy.len();
        Some(healthy[idx].clone())
    }

    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<(StatusCode, HeaderMap, Bytes), ForwardError> {
        let instance = self.next_instance().ok_or(ForwardError::NoHealthyInstance)?;
        let url = format!("{}{}:{}{}", self.scheme, instance.host, instance.port, path_and_query);

        let upstream_headers = strip_hop_by_hop_headers(&headers);

        let start = Instant::now();
        let result = self
            .client
            .request(method, &url)
            .headers(upstream_headers)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;
                self.record_success(response_time_ms);

                let status = response.status();
                let mut out_headers = HeaderMap::new();
                for (name, value) in response.headers() {
                    let lower = name.as_str().to_ascii_lowercase();
                    if lower == "content-length" || lower == "transfer-encoding" {
                        continue;
                    }
                    out_headers.insert(name.clone(), value.clone());
                }
                let body = response.bytes().await.map_err(ForwardError::Upstream)?;
                Ok((status, out_headers, body))
            }
            Err(err) => {
                self.record_failure();
                tracing::error!(
                    event = "taskflow.lb.forward_error",
                    host = %instance.host,
                    port = instance.port,
                    error = %err,
                    "error forwarding request"
                );
                Err(ForwardError::Upstream(err))
            }
        }
    }

    fn record_success(&self, response_time_ms: f64) {
        let mut stats = self.stats.lock().expect("lb stats poisoned");
        stats.total_requests += 1;
        stats.successful_requests += 1;
        let total = stats.total_requests as f64;
        stats.avg_response_time_ms =
            (stats.avg_response_time_ms * (total - 1.0) + response_time_ms) / total;
    }

    fn record_failure(&self) {
        let mut stats = self.stats.lock().expect("lb stats poisoned");
        stats.total_requests += 1;
        stats.failed_requests += 1;
    }

    pub fn stats_snapshot(&self) -> Value {
        let stats = self.stats.lock().expect("lb stats poisoned");
        let instance_stats: Vec<Value> = self
            .instances
            .iter()
            .map(|instance| {
                let state = instance.state.lock().expect("instance state poisoned");
                json!({
                    "host": instance.host,
                    "port": instance.port,
                    "status": state.status,
                    "response_time_ms": state.response_time_ms,
                    "error_count": state.error_count,
                })
            })
            .collect();

        json!({
            "load_balancer_stats": {
                "total_requests": stats.total_requests,
                "successful_requests": stats.successful_requests,
                "failed_requests": stats.failed_requests,
                "avg_response_time_ms": stats.avg_response_time_ms,
            },
            "healthy_instances": self.healthy_instances().len(),
            "total_instances": self.instances.len(),
            "instances": instance_stats,
        })
    }
}
