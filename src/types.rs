use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable logical key for a managed container.
///
/// This is the configured display name, distinct from the runtime-level
/// container name. All cache, pending and surface state is addressed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Container lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    pub const ALL: [ContainerAction; 3] = [
        ContainerAction::Start,
        ContainerAction::Stop,
        ContainerAction::Restart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
        }
    }

    /// The running state this action is expected to leave behind.
    ///
    /// `restart` only checks the final state: a container that ends up
    /// running counts as restarted even if the stop phase was never
    /// observed.
    pub fn expected_running(&self) -> bool {
        match self {
            ContainerAction::Start | ContainerAction::Restart => true,
            ContainerAction::Stop => false,
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a display location is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// May show status cards and the fleet overview
    Status,
    /// May show control buttons and dispatch actions
    Control,
    /// May manage scheduled tasks
    Schedule,
}

/// One reading of a resource metric (CPU or memory)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceReading {
    Value(String),
    Hidden,
    Unavailable,
}

impl fmt::Display for ResourceReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceReading::Value(v) => f.write_str(v),
            ResourceReading::Hidden => f.write_str("Hidden"),
            ResourceReading::Unavailable => f.write_str("N/A"),
        }
    }
}

/// One immutable observation of a container's state at a point in time.
///
/// Snapshots are always replaced wholesale, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub id: ContainerId,
    pub running: bool,
    pub cpu: ResourceReading,
    pub memory: ResourceReading,
    pub uptime: Option<String>,
    pub details_allowed: bool,
}

impl StatusSnapshot {
    /// Snapshot for a container the runtime does not know about.
    /// Not-found is a legitimate state (offline), not an error.
    pub fn offline(id: ContainerId, details_allowed: bool) -> Self {
        Self {
            id,
            running: false,
            cpu: ResourceReading::Unavailable,
            memory: ResourceReading::Unavailable,
            uptime: None,
            details_allowed,
        }
    }
}
