//! Health-checked round-robin reverse proxy in front of the TaskFlow API,
//! ported from an `aiohttp` load balancer to `axum` + `reqwest`.

mod balancer;
mod instance;
mod server;

pub use balancer::{ForwardError, LoadBalancer};
pub use instance::{Instance, InstanceStatus};
pub use server::{build_router, health_check_loop};
