use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod api;
mod backends;
mod config;
mod enqueue;
mod load_balancer;
mod processor;
mod worker;

#[derive(Parser, Debug)]
#[command(name = "taskflow-harness")]
#[command(about = "TaskFlow distributed task processing platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server, with its own embedded worker thread.
    Api,

    /// Run a standalone worker process against the shared queue/storage.
    Worker,

    /// Run the health-checked reverse-proxy load balancer.
    LoadBalancer,

    /// Enqueue a single task for manual testing.
    Enqueue {
        #[arg(long, default_value = "manual-task")]
        name: String,

        #[arg(long, default_value_t = 3)]
        priority: i32,

        /// Retry bound the worker reads on failure; defaults to the
        /// worker's built-in default of 3 when omitted.
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::TaskFlowConfig::from_env().context("load taskflow config")?;

    match cli.command {
        Command::Api => api::run(&cfg).await,
        Command::Worker => worker::run(&cfg).await,
        Command::LoadBalancer => load_balancer::run(&cfg).await,
        Command::Enqueue { name, priority, max_retries } => {
            enqueue::run(&cfg, name, priority, max_retries)
        }
    }
}
