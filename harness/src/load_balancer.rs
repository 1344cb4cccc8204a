use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use taskflow_lb::{build_router, health_check_loop, LoadBalancer};
use tokio::sync::watch;

use crate::config::TaskFlowConfig;

pub async fn run(cfg: &TaskFlowConfig) -> anyhow::Result<()> {
    let backends = cfg.lb_backend_list();
    if backends.is_empty() {
        anyhow::bail!("TASKFLOW_LB_BACKENDS produced no valid host:port entries");
    }

    let lb = Arc::new(LoadBalancer::new("http://", backends));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_interval = Duration::from_secs(cfg.lb_health_interval_secs);
    let health_task = tokio::spawn(health_check_loop(lb.clone(), health_interval, shutdown_rx));

    let addr: std::net::SocketAddr = cfg
        .lb_bind
        .parse()
        .with_context(|| format!("parse TASKFLOW_LB_BIND={}", cfg.lb_bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind load balancer to {addr}"))?;
    tracing::info!(event = "taskflow.lb.started", addr = %addr, "load balancer listening");

    let app = build_router(lb);
    tokio::select! {
        res = axum::serve(listener, app.into_make_service()) => {
            res.context("load balancer serve")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(event = "taskflow.lb.shutdown", "load balancer shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = health_task.await;
    Ok(())
}
