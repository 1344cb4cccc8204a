use std::collections::HashMap;

use taskflow_core::QueueBackend;

use crate::{backends, config::TaskFlowConfig};

/// Enqueues a single task against the configured queue backend. Exists
/// purely for manual testing: exercise `taskflow-api worker` end to end
/// without curling `/tasks` by hand.
pub fn run(
    cfg: &TaskFlowConfig,
    name: String,
    priority: i32,
    max_retries: Option<u32>,
) -> anyhow::Result<()> {
    let queue = backends::build_queue(cfg)?;
    let id = queue.enqueue(name, priority, HashMap::new(), None, max_retries)?;
    println!("enqueued task_id={id}");
    Ok(())
}
