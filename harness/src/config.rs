use clap::Parser;

/// Harness configuration.
///
/// Parsed once at startup from environment variables (with CLI-flag
/// overrides available for local runs); passed by reference from there on.
/// Defaults aim for a single-process, all-in-memory quickstart.
#[derive(Parser, Debug, Clone)]
pub struct TaskFlowConfig {
    /// Bind address for the task API server.
    #[arg(long, env = "TASKFLOW_API_BIND", default_value = "127.0.0.1:8000")]
    pub api_bind: String,

    /// `in_memory` or `remote`.
    #[arg(long, env = "TASKFLOW_QUEUE_BACKEND", default_value = "in_memory")]
    pub queue_backend: String,

    /// Base URL of the remote queue service, used when `queue_backend = remote`.
    #[arg(long, env = "TASKFLOW_REMOTE_QUEUE_URL", default_value = "http://localhost:9324")]
    pub remote_queue_url: String,

    /// `local_fs` or `object_store`.
    #[arg(long, env = "TASKFLOW_STORAGE_BACKEND", default_value = "local_fs")]
    pub storage_backend: String,

    /// Directory for JSON task files, used when `storage_backend = local_fs`.
    #[arg(long, env = "TASKFLOW_STORAGE_DIR", default_value = "./taskflow-data")]
    pub storage_dir: String,

    /// Object store endpoint, used when `storage_backend = object_store`.
    #[arg(long, env = "TASKFLOW_OBJECT_STORE_ENDPOINT", default_value = "http://localhost:9000")]
    pub object_store_endpoint: String,

    #[arg(long, env = "TASKFLOW_OBJECT_STORE_BUCKET", default_value = "taskflow")]
    pub object_store_bucket: String,

    /// How long the worker blocks on an empty queue before re-checking its running flag.
    #[arg(long, env = "TASKFLOW_WORKER_POLL_TIMEOUT_MS", default_value_t = 1000)]
    pub worker_poll_timeout_ms: u64,

    /// Bind address for the reverse-proxy load balancer.
    #[arg(long, env = "TASKFLOW_LB_BIND", default_value = "127.0.0.1:8080")]
    pub lb_bind: String,

    /// Comma-separated `host:port` pairs of API instances to balance across.
    #[arg(long, env = "TASKFLOW_LB_BACKENDS", default_value = "localhost:8001,localhost:8002,localhost:8003")]
    pub lb_backends: String,

    #[arg(long, env = "TASKFLOW_LB_HEALTH_INTERVAL_SECS", default_value_t = 30)]
    pub lb_health_interval_secs: u64,
}

impl TaskFlowConfig {
    /// Parse config from environment only (no CLI parsing) so clap doesn't
    /// try to interpret the harness subcommand's own flags here.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::parse_from(["taskflow-harness"]))
    }

    /// Splits `lb_backends` into `(host, port)` pairs, skipping malformed entries.
    pub fn lb_backend_list(&self) -> Vec<(String, u16)> {
        self.lb_backends
            .split(',')
            .filter_map(|entry| {
                let entry = entry.trim();
                let (host, port) = entry.rsplit_once(':')?;
                let port: u16 = port.parse().ok()?;
                Some((host.to_string(), port))
            })
            .collect()
    }
}
