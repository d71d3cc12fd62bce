use super::{InspectOutcome, InspectReport, ResourceStats, RuntimeGateway};
use crate::config::Deckfile;
use crate::error::GatewayError;
use crate::types::ContainerAction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Gateway implementation that shells out to the `docker` binary.
///
/// Each call runs under a per-container timeout budget; heavy containers
/// (large game servers, mostly) get a longer leash than light ones.
pub struct DockerCli {
    docker_bin: String,
    budgets: HashMap<String, Duration>,
    default_budget: Duration,
    /// Lifecycle actions get extra headroom on top of the inspect budget.
    action_budget: Duration,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            budgets: HashMap::new(),
            default_budget: Duration::from_secs(6),
            action_budget: Duration::from_secs(30),
        }
    }

    /// Build budgets from the configured timeout classes.
    pub fn from_config(config: &Deckfile) -> Self {
        let mut gateway = Self::new();
        for spec in &config.containers {
            gateway
                .budgets
                .insert(spec.docker_name.clone(), spec.timeout_class.budget());
        }
        gateway
    }

    pub fn with_docker_bin(mut self, bin: impl Into<String>) -> Self {
        self.docker_bin = bin.into();
        self
    }

    fn budget_for(&self, container: &str) -> Duration {
        self.budgets
            .get(container)
            .copied()
            .unwrap_or(self.default_budget)
    }

    async fn run_docker(
        &self,
        container: &str,
        budget: Duration,
        args: &[&str],
    ) -> Result<std::process::Output, GatewayError> {
        debug!("🐳 docker {} (budget: {:?})", args.join(" "), budget);

        let child = Command::new(&self.docker_bin)
            .args(args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(budget, child).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(GatewayError::Unavailable {
                reason: format!("failed to spawn {}: {e}", self.docker_bin),
            }),
            Err(_) => Err(GatewayError::Timeout {
                container: container.to_string(),
                seconds: budget.as_secs(),
            }),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeGateway for DockerCli {
    async fn inspect(&self, container: &str) -> Result<InspectOutcome, GatewayError> {
        let output = self
            .run_docker(
                container,
                self.budget_for(container),
                &["inspect", "--format", "{{json .State}}", container],
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such object") || stderr.contains("No such container") {
                return Ok(InspectOutcome::NotFound);
            }
            return Err(GatewayError::Unavailable {
                reason: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let report = parse_state_json(container, stdout.trim())?;
        Ok(InspectOutcome::Present(report))
    }

    async fn stats(&self, container: &str) -> Result<ResourceStats, GatewayError> {
        let output = self
            .run_docker(
                container,
                self.budget_for(container),
                &[
                    "stats",
                    "--no-stream",
                    "--format",
                    "{{.CPUPerc}};{{.MemUsage}}",
                    container,
                ],
            )
            .await?;

        if !output.status.success() {
            return Err(GatewayError::Unavailable {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_stats_line(container, stdout.trim())
    }

    async fn act(&self, container: &str, action: ContainerAction) -> Result<(), GatewayError> {
        let output = self
            .run_docker(container, self.action_budget, &[action.as_str(), container])
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            let reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("Docker {action} failed for '{container}': {reason}");
            Err(GatewayError::ActionFailed {
                container: container.to_string(),
                action: action.as_str().to_string(),
                reason,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct DockerState {
    #[serde(rename = "Running")]
    running: bool,
    #[serde(rename = "StartedAt")]
    started_at: Option<String>,
}

fn parse_state_json(container: &str, raw: &str) -> Result<InspectReport, GatewayError> {
    let state: DockerState =
        serde_json::from_str(raw).map_err(|e| GatewayError::MalformedResponse {
            container: container.to_string(),
            reason: format!("inspect output: {e}"),
        })?;

    // Docker reports the zero time for containers that never started.
    let started_at = state
        .started_at
        .as_deref()
        .filter(|s| !s.starts_with("0001-01-01"))
        .and_then(parse_docker_time);

    Ok(InspectReport {
        running: state.running,
        started_at,
    })
}

fn parse_docker_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_stats_line(container: &str, line: &str) -> Result<ResourceStats, GatewayError> {
    let mut parts = line.splitn(2, ';');
    let cpu = parts.next().map(str::trim).unwrap_or_default();
    let memory = parts.next().map(str::trim);

    let memory = memory.ok_or_else(|| GatewayError::MalformedResponse {
        container: container.to_string(),
        reason: format!("stats output: '{line}'"),
    })?;

    // MemUsage reads "50MiB / 7.6GiB"; only the used side is interesting.
    let memory = memory.split('/').next().unwrap_or(memory).trim();

    Ok(ResourceStats {
        cpu: cpu.to_string(),
        memory: memory.to_string(),
    })
}
