//! The status core: one fetch path, a staleness-bounded cache, and the
//! pending-action state machine that sits between user intent and
//! observed container state.

use crate::config::ContainerSpec;
use crate::render::format::humanize_uptime;
use crate::runtime::{InspectOutcome, RuntimeGateway};
use crate::types::{ResourceReading, StatusSnapshot};
use chrono::Utc;
use tracing::{debug, warn};

pub mod cache;
pub mod pending;
pub mod refresher;

pub use cache::{CacheEntry, GenerationSnapshot, StatusCache};
pub use pending::{PendingAction, PendingTracker, ReconcileOutcome, PENDING_TIMEOUT_SECS};
pub use refresher::RefreshScheduler;

/// Result of one status fetch for one container.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The runtime answered; here is what it said.
    Ok(StatusSnapshot),
    /// The runtime does not know this container. A legitimate state
    /// (offline), cacheable like any other observation.
    NotFound,
    /// Timeout or transport failure. Never written to the cache:
    /// previously known-good data stays, it only ages.
    TransientError(String),
}

impl FetchOutcome {
    /// The snapshot this outcome contributes to the cache, if any.
    pub fn into_cacheable(self, spec: &ContainerSpec) -> Option<StatusSnapshot> {
        match self {
            FetchOutcome::Ok(snapshot) => Some(snapshot),
            FetchOutcome::NotFound => Some(StatusSnapshot::offline(
                spec.id(),
                spec.allow_detailed_status,
            )),
            FetchOutcome::TransientError(_) => None,
        }
    }
}

/// Fetch the current status of one container through the gateway.
///
/// Stats are only requested for running containers whose config permits
/// detailed status; a failed stats call degrades the readings to
/// unavailable instead of failing the whole fetch.
pub async fn probe(gateway: &dyn RuntimeGateway, spec: &ContainerSpec) -> FetchOutcome {
    let report = match gateway.inspect(&spec.docker_name).await {
        Ok(InspectOutcome::Present(report)) => report,
        Ok(InspectOutcome::NotFound) => {
            debug!(
                "Container '{}' not found in runtime, treating as offline",
                spec.docker_name
            );
            return FetchOutcome::NotFound;
        }
        Err(e) => return FetchOutcome::TransientError(e.to_string()),
    };

    if !report.running {
        return FetchOutcome::Ok(StatusSnapshot {
            id: spec.id(),
            running: false,
            cpu: ResourceReading::Unavailable,
            memory: ResourceReading::Unavailable,
            uptime: None,
            details_allowed: spec.allow_detailed_status,
        });
    }

    let uptime = report
        .started_at
        .map(|started| humanize_uptime(Utc::now() - started));

    let (cpu, memory) = if spec.allow_detailed_status {
        match gateway.stats(&spec.docker_name).await {
            Ok(stats) => (
                ResourceReading::Value(stats.cpu),
                ResourceReading::Value(stats.memory),
            ),
            Err(e) => {
                warn!(
                    "Could not retrieve stats for running container '{}': {e}",
                    spec.docker_name
                );
                (ResourceReading::Unavailable, ResourceReading::Unavailable)
            }
        }
    } else {
        (ResourceReading::Hidden, ResourceReading::Hidden)
    };

    FetchOutcome::Ok(StatusSnapshot {
        id: spec.id(),
        running: true,
        cpu,
        memory,
        uptime,
        details_allowed: spec.allow_detailed_status,
    })
}
