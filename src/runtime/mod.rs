use crate::error::GatewayError;
use crate::types::ContainerAction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod docker_cli;

pub use docker_cli::DockerCli;

/// What an inspect call learned about a container that exists.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectReport {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// Result of inspecting a container reference.
///
/// Not-found is distinct from a transient error: a container the runtime
/// does not know about renders as offline, while a transient error keeps
/// previously cached data alive.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectOutcome {
    Present(InspectReport),
    NotFound,
}

/// Point-in-time resource usage of a running container
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceStats {
    pub cpu: String,
    pub memory: String,
}

/// Narrow contract to the container runtime.
///
/// Every call must be timeout-bounded by the implementation; a timeout
/// surfaces as [`GatewayError::Timeout`] so callers can treat it as
/// non-definitive.
#[async_trait]
pub trait RuntimeGateway: Send + Sync {
    /// Inspect a container by its runtime-level name.
    async fn inspect(&self, container: &str) -> Result<InspectOutcome, GatewayError>;

    /// Resource usage for a running container. Only invoked when detailed
    /// status is permitted for the container.
    async fn stats(&self, container: &str) -> Result<ResourceStats, GatewayError>;

    /// Execute a lifecycle action against a container.
    async fn act(&self, container: &str, action: ContainerAction) -> Result<(), GatewayError>;
}
