use crate::types::{Capability, ContainerAction, ContainerId};
use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// The Deckfile: everything Deckhand needs to know about the fleet it
/// watches and the locations it reports to. Loaded once, treated as an
/// immutable snapshot for the lifetime of the process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Deckfile {
    pub project: String,
    /// Display order for overview and initial sends; unlisted containers
    /// follow in config order. Plain values must precede the tables for
    /// TOML serialization.
    #[serde(default)]
    pub order: Vec<String>,
    #[serde(default)]
    pub presentation: Presentation,
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub locations: HashMap<String, LocationPolicy>,
    /// Policy applied to locations without an explicit entry.
    #[serde(default)]
    pub location_defaults: LocationPolicy,
    #[serde(default)]
    pub refresh: RefreshSettings,
    pub heartbeat: Option<HeartbeatSettings>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Presentation {
    /// IANA timezone name for displayed clock times (e.g. "Europe/Berlin").
    /// Timestamps are kept in UTC everywhere else.
    pub timezone: Option<String>,
    #[serde(default = "default_box_width")]
    pub box_width: usize,
}

impl Presentation {
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.as_deref().and_then(|name| name.parse().ok())
    }

    pub fn box_width(&self) -> usize {
        if self.box_width == 0 {
            default_box_width()
        } else {
            self.box_width
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContainerSpec {
    /// Display name, used as the container's identity everywhere.
    pub name: String,
    /// Name the container runtime knows this container by.
    pub docker_name: String,
    #[serde(default = "default_allowed_actions")]
    pub allowed_actions: Vec<ContainerAction>,
    #[serde(default = "default_true")]
    pub allow_detailed_status: bool,
    #[serde(default)]
    pub timeout_class: TimeoutClass,
}

impl ContainerSpec {
    pub fn id(&self) -> ContainerId {
        ContainerId::new(self.name.clone())
    }

    pub fn allows(&self, action: ContainerAction) -> bool {
        self.allowed_actions.contains(&action)
    }
}

/// Gateway timeout budget per container class. Heavy game servers need
/// far longer than a small web service to answer an inspect call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutClass {
    Light,
    #[default]
    Standard,
    Heavy,
}

impl TimeoutClass {
    pub fn budget(&self) -> Duration {
        match self {
            TimeoutClass::Light => Duration::from_secs(3),
            TimeoutClass::Standard => Duration::from_secs(6),
            TimeoutClass::Heavy => Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocationPolicy {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Publish status cards into this location at startup.
    #[serde(default)]
    pub post_initial: bool,
    #[serde(default = "default_true")]
    pub auto_refresh: bool,
    #[serde(default = "default_update_interval")]
    pub update_interval_minutes: u64,
    #[serde(default = "default_true")]
    pub recreate_on_inactivity: bool,
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_minutes: u64,
}

impl Default for LocationPolicy {
    fn default() -> Self {
        Self {
            capabilities: vec![Capability::Status],
            post_initial: false,
            auto_refresh: true,
            update_interval_minutes: default_update_interval(),
            recreate_on_inactivity: true,
            inactivity_timeout_minutes: default_inactivity_timeout(),
        }
    }
}

impl LocationPolicy {
    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes * 60)
    }

    /// `None` when inactivity-driven recreation is disabled.
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        if self.recreate_on_inactivity && self.inactivity_timeout_minutes > 0 {
            Some(Duration::from_secs(self.inactivity_timeout_minutes * 60))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshSettings {
    /// Period of the status cache sweep.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Period of the surface edit/inactivity check ticks.
    #[serde(default = "default_tick_secs")]
    pub surface_tick_secs: u64,
    /// Delay before the initial publish after startup.
    #[serde(default = "default_initial_delay")]
    pub initial_send_delay_secs: u64,
    /// How many messages to scan when clearing a location.
    #[serde(default = "default_delete_scan_limit")]
    pub delete_scan_limit: usize,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            surface_tick_secs: default_tick_secs(),
            initial_send_delay_secs: default_initial_delay(),
            delete_scan_limit: default_delete_scan_limit(),
        }
    }
}

impl RefreshSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn surface_tick(&self) -> Duration {
        Duration::from_secs(self.surface_tick_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeartbeatSettings {
    #[serde(default)]
    pub enabled: bool,
    pub location: Option<String>,
    #[serde(default = "default_heartbeat_interval")]
    pub interval_minutes: u64,
}

fn default_true() -> bool {
    true
}

fn default_box_width() -> usize {
    28
}

fn default_allowed_actions() -> Vec<ContainerAction> {
    ContainerAction::ALL.to_vec()
}

fn default_update_interval() -> u64 {
    5
}

fn default_inactivity_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    30
}

fn default_tick_secs() -> u64 {
    60
}

fn default_initial_delay() -> u64 {
    10
}

fn default_delete_scan_limit() -> usize {
    300
}

fn default_heartbeat_interval() -> u64 {
    60
}

impl Deckfile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read Deckfile at {:?}", path.as_ref()))?;

        let config: Deckfile =
            toml::from_str(&content).with_context(|| "Failed to parse Deckfile")?;

        config.validate()?;

        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize Deckfile")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write Deckfile at {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deckhand")
            .join("Deckfile.toml")
    }

    /// Comprehensive validation of the Deckfile configuration
    pub fn validate(&self) -> Result<()> {
        debug!("🔍 Validating Deckfile configuration");

        self.validate_basic()?;
        self.validate_containers()?;
        self.validate_order()?;
        self.validate_locations()?;
        self.validate_presentation()?;
        self.validate_heartbeat()?;

        debug!("✅ Deckfile validation passed");
        Ok(())
    }

    fn validate_basic(&self) -> Result<()> {
        if self.project.is_empty() {
            return Err(anyhow!("Project name cannot be empty"));
        }

        if self.containers.is_empty() {
            return Err(anyhow!("At least one container must be configured"));
        }

        Ok(())
    }

    fn validate_containers(&self) -> Result<()> {
        let mut seen_names = HashSet::new();
        let mut seen_docker_names = HashSet::new();

        for spec in &self.containers {
            if spec.name.is_empty() {
                return Err(anyhow!("Container display name cannot be empty"));
            }
            if spec.docker_name.is_empty() {
                return Err(anyhow!(
                    "Container '{}' is missing its docker_name",
                    spec.name
                ));
            }
            if !seen_names.insert(&spec.name) {
                return Err(anyhow!("Duplicate container name: '{}'", spec.name));
            }
            if !seen_docker_names.insert(&spec.docker_name) {
                return Err(anyhow!(
                    "Duplicate docker_name: '{}' (container '{}')",
                    spec.docker_name,
                    spec.name
                ));
            }
        }

        Ok(())
    }

    fn validate_order(&self) -> Result<()> {
        for name in &self.order {
            if !self.containers.iter().any(|s| &s.name == name) {
                return Err(anyhow!(
                    "Display order references unknown container: '{name}'"
                ));
            }
        }
        Ok(())
    }

    fn validate_locations(&self) -> Result<()> {
        for (location, policy) in &self.locations {
            if location.is_empty() {
                return Err(anyhow!("Location id cannot be empty"));
            }
            if policy.auto_refresh && policy.update_interval_minutes == 0 {
                return Err(anyhow!(
                    "Location '{location}' enables auto-refresh with a zero update interval"
                ));
            }
        }
        Ok(())
    }

    fn validate_presentation(&self) -> Result<()> {
        if let Some(name) = self.presentation.timezone.as_deref() {
            name.parse::<Tz>()
                .map_err(|_| anyhow!("Unknown timezone: '{name}'"))?;
        }
        Ok(())
    }

    fn validate_heartbeat(&self) -> Result<()> {
        if let Some(hb) = &self.heartbeat {
            if hb.enabled && hb.location.is_none() {
                return Err(anyhow!("Heartbeat is enabled but no location is configured"));
            }
            if hb.enabled && hb.interval_minutes == 0 {
                return Err(anyhow!("Heartbeat interval must be at least one minute"));
            }
        }
        Ok(())
    }

    pub fn container(&self, id: &ContainerId) -> Option<&ContainerSpec> {
        self.containers.iter().find(|s| s.name == id.as_str())
    }

    /// Containers in display order: the explicit `order` list first, then
    /// everything else in config order.
    pub fn ordered_containers(&self) -> Vec<&ContainerSpec> {
        let mut ordered = Vec::with_capacity(self.containers.len());
        let mut seen = HashSet::new();

        for name in &self.order {
            if let Some(spec) = self.containers.iter().find(|s| &s.name == name) {
                if seen.insert(&spec.name) {
                    ordered.push(spec);
                }
            }
        }
        for spec in &self.containers {
            if seen.insert(&spec.name) {
                ordered.push(spec);
            }
        }

        ordered
    }

    pub fn policy_for(&self, location: &str) -> &LocationPolicy {
        self.locations
            .get(location)
            .unwrap_or(&self.location_defaults)
    }

    pub fn location_allows(&self, location: &str, capability: Capability) -> bool {
        self.policy_for(location).allows(capability)
    }
}

/// Create an example Deckfile for `deckhand init`
pub fn create_example_deckfile() -> Deckfile {
    info!("📝 Creating example Deckfile");

    let mut locations = HashMap::new();
    locations.insert(
        "ops-room".to_string(),
        LocationPolicy {
            capabilities: vec![Capability::Status, Capability::Control, Capability::Schedule],
            post_initial: true,
            ..LocationPolicy::default()
        },
    );
    locations.insert(
        "lobby".to_string(),
        LocationPolicy {
            capabilities: vec![Capability::Status],
            post_initial: true,
            update_interval_minutes: 10,
            ..LocationPolicy::default()
        },
    );

    Deckfile {
        project: "my-fleet".to_string(),
        presentation: Presentation {
            timezone: Some("Europe/Berlin".to_string()),
            box_width: default_box_width(),
        },
        containers: vec![
            ContainerSpec {
                name: "web".to_string(),
                docker_name: "nginx-frontend".to_string(),
                allowed_actions: ContainerAction::ALL.to_vec(),
                allow_detailed_status: true,
                timeout_class: TimeoutClass::Light,
            },
            ContainerSpec {
                name: "game".to_string(),
                docker_name: "satisfactory-server".to_string(),
                allowed_actions: vec![ContainerAction::Start, ContainerAction::Restart],
                allow_detailed_status: false,
                timeout_class: TimeoutClass::Heavy,
            },
        ],
        order: vec!["web".to_string(), "game".to_string()],
        locations,
        location_defaults: LocationPolicy::default(),
        refresh: RefreshSettings::default(),
        heartbeat: Some(HeartbeatSettings {
            enabled: false,
            location: Some("ops-room".to_string()),
            interval_minutes: default_heartbeat_interval(),
        }),
    }
}
