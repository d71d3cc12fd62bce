use super::{LocationId, SurfacePlatform};
use crate::config::HeartbeatSettings;
use crate::render::{CardKind, StatusCard};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Periodic liveness signal to one configured location, so an external
/// watcher can tell the service is still up. Off by default.
pub struct Heartbeat {
    settings: HeartbeatSettings,
    platform: Arc<dyn SurfacePlatform>,
}

impl Heartbeat {
    pub fn new(settings: HeartbeatSettings, platform: Arc<dyn SurfacePlatform>) -> Self {
        Self { settings, platform }
    }

    /// Run the heartbeat loop forever. Intended for `tokio::spawn`;
    /// returns immediately when disabled or misconfigured.
    pub async fn run(self) {
        if !self.settings.enabled {
            return;
        }
        let Some(location) = self.settings.location.clone().map(LocationId::new) else {
            warn!("Heartbeat enabled but no location configured, not starting");
            return;
        };

        let period = Duration::from_secs(self.settings.interval_minutes * 60);
        info!(
            "❤️ Starting heartbeat loop to '{location}' ({}m interval)",
            self.settings.interval_minutes
        );

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let card = StatusCard {
                kind: CardKind::Status,
                body: format!("❤️ Heartbeat signal at {}", Utc::now().to_rfc3339()),
                actions: Vec::new(),
                toggle_available: false,
                running: true,
            };
            if let Err(e) = self.platform.create(&location, &card).await {
                warn!("Heartbeat send to '{location}' failed: {e}");
            }
        }
    }
}
