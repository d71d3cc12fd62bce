use super::{LocationId, PushOutcome, SurfaceId, SurfacePlatform};
use crate::config::Deckfile;
use crate::error::Result;
use crate::render::{RenderContext, RenderEngine, StatusCard};
use crate::status::{PendingTracker, StatusCache};
use crate::types::{Capability, ContainerId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What one tracked surface displays.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Container(ContainerId),
    Overview,
}

/// One surface the coordinator keeps fresh. Tracked surfaces are SENT;
/// untracking is the TORN_DOWN end of the lifecycle; a later publish
/// creates a fresh surface with a new id.
#[derive(Debug, Clone)]
struct TrackedSurface {
    surface: SurfaceId,
    target: Target,
    last_pushed_at: Option<DateTime<Utc>>,
    expanded: bool,
}

#[derive(Debug, Clone)]
struct LocationState {
    surfaces: Vec<TrackedSurface>,
    last_activity_at: DateTime<Utc>,
}

/// Per-location scheduling of surface updates.
///
/// Decides, on every tick, whether each tracked surface is due a
/// re-render (its location's configured minimum interval), and
/// independently whether a location has gone quiet for long enough that
/// its surfaces should be torn down and recreated at the bottom.
pub struct RefreshCoordinator {
    config: Arc<Deckfile>,
    cache: Arc<StatusCache>,
    pending: Arc<PendingTracker>,
    engine: Arc<RenderEngine>,
    platform: Arc<dyn SurfacePlatform>,
    locations: RwLock<HashMap<LocationId, LocationState>>,
}

impl RefreshCoordinator {
    pub fn new(
        config: Arc<Deckfile>,
        cache: Arc<StatusCache>,
        pending: Arc<PendingTracker>,
        engine: Arc<RenderEngine>,
        platform: Arc<dyn SurfacePlatform>,
    ) -> Self {
        Self {
            config,
            cache,
            pending,
            engine,
            platform,
            locations: RwLock::new(HashMap::new()),
        }
    }

    /// Tear down the bot's content in a location and publish fresh
    /// surfaces: per-container cards where the location may control,
    /// a single overview card where it may only watch.
    pub async fn publish_location(&self, location: &LocationId) -> Result<()> {
        let policy = self.config.policy_for(location.as_str());
        let has_control = policy.allows(Capability::Control);
        let has_status = policy.allows(Capability::Status);

        if !has_control && !has_status {
            debug!("Location '{location}' has no display capability, nothing to publish");
            return Ok(());
        }

        {
            let mut locations = self.locations.write().await;
            locations.remove(location);
        }

        let deleted = self
            .platform
            .delete_bot_content(location, self.config.refresh.delete_scan_limit)
            .await?;
        if deleted > 0 {
            debug!("Cleared {deleted} previous messages in '{location}'");
        }

        let now = Utc::now();
        let mut surfaces = Vec::new();

        if has_control {
            for spec in self.config.ordered_containers() {
                let target = Target::Container(spec.id());
                let card = self.render_target(location, &target, false).await;
                match self.platform.create(location, &card).await {
                    Ok(surface) => surfaces.push(TrackedSurface {
                        surface,
                        target,
                        last_pushed_at: Some(now),
                        expanded: false,
                    }),
                    Err(e) => {
                        warn!("Failed to create surface for '{}' in '{location}': {e}", spec.name);
                    }
                }
            }
        } else {
            let card = self.render_target(location, &Target::Overview, false).await;
            match self.platform.create(location, &card).await {
                Ok(surface) => surfaces.push(TrackedSurface {
                    surface,
                    target: Target::Overview,
                    last_pushed_at: Some(now),
                    expanded: false,
                }),
                Err(e) => warn!("Failed to create overview surface in '{location}': {e}"),
            }
        }

        info!(
            "📤 Published {} surface(s) to '{location}' ({})",
            surfaces.len(),
            if has_control { "control" } else { "status" }
        );

        let mut locations = self.locations.write().await;
        locations.insert(
            location.clone(),
            LocationState {
                surfaces,
                last_activity_at: now,
            },
        );

        Ok(())
    }

    /// Publish to every location configured for an initial post.
    pub async fn publish_initial(&self) {
        let targets: Vec<LocationId> = self
            .config
            .locations
            .iter()
            .filter(|(_, policy)| policy.post_initial)
            .map(|(name, _)| LocationId::new(name.clone()))
            .collect();

        if targets.is_empty() {
            info!("No locations configured for initial posting");
            return;
        }

        info!("📣 Publishing initial status to {} location(s)", targets.len());
        for location in targets {
            if let Err(e) = self.publish_location(&location).await {
                warn!("Initial publish to '{location}' failed: {e}");
            }
        }
    }

    /// A user interacted with a tracked location; reset its idle clock.
    pub async fn note_user_activity(&self, location: &LocationId) {
        let mut locations = self.locations.write().await;
        if let Some(state) = locations.get_mut(location) {
            state.last_activity_at = Utc::now();
        }
    }

    /// Flip a surface's expanded state and push the re-render right away.
    /// Returns the new card, or `None` for an unknown surface.
    pub async fn toggle_expanded(&self, surface: &SurfaceId) -> Option<StatusCard> {
        let (location, target, expanded) = {
            let mut locations = self.locations.write().await;
            let (location, state) = locations
                .iter_mut()
                .find(|(_, state)| state.surfaces.iter().any(|s| &s.surface == surface))?;

            let tracked = state
                .surfaces
                .iter_mut()
                .find(|s| &s.surface == surface)
                .expect("surface present by find above");
            tracked.expanded = !tracked.expanded;
            state.last_activity_at = Utc::now();
            (location.clone(), tracked.target.clone(), tracked.expanded)
        };

        let card = self.render_target(&location, &target, expanded).await;
        match self.platform.push(surface, &card).await {
            PushOutcome::Ok => {
                self.mark_pushed(&location, surface, Utc::now()).await;
            }
            PushOutcome::NotFound | PushOutcome::Forbidden => {
                self.untrack(&location, surface).await;
            }
            PushOutcome::RateLimited => {
                debug!("Toggle push rate-limited for surface '{surface}'");
            }
        }

        Some(card)
    }

    /// Run the periodic edit loop forever. Intended for `tokio::spawn`.
    pub async fn run_refresh_loop(self: Arc<Self>) {
        let period = self.config.refresh.surface_tick();
        info!("🔁 Starting surface refresh loop ({}s tick)", period.as_secs());

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.refresh_tick(Utc::now()).await;
        }
    }

    /// Run the inactivity check loop forever. Intended for `tokio::spawn`.
    pub async fn run_inactivity_loop(self: Arc<Self>) {
        let period = self.config.refresh.surface_tick();
        info!("💤 Starting inactivity check loop ({}s tick)", period.as_secs());

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.inactivity_tick(Utc::now()).await;
        }
    }

    /// One pass over all tracked surfaces, pushing re-renders where the
    /// location's minimum interval has elapsed.
    pub async fn refresh_tick(&self, now: DateTime<Utc>) {
        let due = self.collect_due(now).await;
        if due.is_empty() {
            debug!("Surface refresh tick: nothing due");
            return;
        }

        debug!("Surface refresh tick: {} surface(s) due", due.len());
        for (location, surface, target, expanded) in due {
            let card = self.render_target(&location, &target, expanded).await;
            match self.platform.push(&surface, &card).await {
                PushOutcome::Ok => {
                    self.mark_pushed(&location, &surface, now).await;
                }
                PushOutcome::NotFound => {
                    warn!("Surface '{surface}' in '{location}' is gone, untracking");
                    self.untrack(&location, &surface).await;
                }
                PushOutcome::Forbidden => {
                    warn!("Pushes to '{location}' are forbidden, untracking surface '{surface}'");
                    self.untrack(&location, &surface).await;
                }
                PushOutcome::RateLimited => {
                    // Leave last_pushed_at untouched; retried next tick.
                    warn!("Push to surface '{surface}' rate-limited, deferring");
                }
            }
        }
    }

    /// Tear down and recreate locations that have gone quiet, unless the
    /// bot's own push is the newest thing there, in which case the clock
    /// resets instead.
    pub async fn inactivity_tick(&self, now: DateTime<Utc>) {
        let candidates: Vec<LocationId> = {
            let locations = self.locations.read().await;
            locations
                .iter()
                .filter_map(|(location, state)| {
                    let timeout = self.config.policy_for(location.as_str()).inactivity_timeout()?;
                    let idle = (now - state.last_activity_at)
                        .to_std()
                        .unwrap_or_default();
                    (idle >= timeout).then(|| location.clone())
                })
                .collect()
        };

        for location in candidates {
            match self.platform.last_message_is_own(&location).await {
                Ok(true) => {
                    debug!(
                        "Location '{location}' idle but our push is still the latest message, resetting clock"
                    );
                    let mut locations = self.locations.write().await;
                    if let Some(state) = locations.get_mut(&location) {
                        state.last_activity_at = now;
                    }
                }
                Ok(false) => {
                    info!("🧹 Location '{location}' inactive, recreating surfaces");
                    if let Err(e) = self.publish_location(&location).await {
                        warn!("Recreation of '{location}' failed: {e}");
                    }
                }
                Err(e) => {
                    warn!("Inactivity check for '{location}' failed: {e}");
                }
            }
        }
    }

    /// How many surfaces are currently tracked (all locations).
    pub async fn tracked_surfaces(&self) -> usize {
        self.locations
            .read()
            .await
            .values()
            .map(|state| state.surfaces.len())
            .sum()
    }

    async fn collect_due(
        &self,
        now: DateTime<Utc>,
    ) -> Vec<(LocationId, SurfaceId, Target, bool)> {
        let locations = self.locations.read().await;
        let mut due = Vec::new();

        for (location, state) in locations.iter() {
            let policy = self.config.policy_for(location.as_str());
            if !policy.auto_refresh {
                continue;
            }
            let min_interval = policy.update_interval();

            for tracked in &state.surfaces {
                let is_due = match tracked.last_pushed_at {
                    None => true,
                    Some(last) => (now - last).to_std().unwrap_or_default() >= min_interval,
                };
                if is_due {
                    due.push((
                        location.clone(),
                        tracked.surface.clone(),
                        tracked.target.clone(),
                        tracked.expanded,
                    ));
                }
            }
        }

        due
    }

    async fn render_target(&self, location: &LocationId, target: &Target, expanded: bool) -> StatusCard {
        match target {
            Target::Container(id) => {
                let policy = self.config.policy_for(location.as_str());
                let has_control = policy.allows(Capability::Control);
                let ctx = RenderContext {
                    // Non-control locations are forced collapsed.
                    expanded: expanded && has_control,
                    allow_controls: has_control,
                    allow_toggle: has_control,
                };

                let spec = self.config.container(id);
                let entry = self.cache.get(id).await;
                let pending = self.pending.get(id).await;
                self.engine
                    .render(spec, entry.as_ref(), pending.as_ref(), &ctx, Utc::now())
            }
            Target::Overview => {
                let generation = self.cache.generation().await;
                let pending_ids = self.pending.active_ids(Utc::now()).await;
                let order = self.config.ordered_containers();
                self.engine.render_overview(&order, &generation, &pending_ids)
            }
        }
    }

    async fn mark_pushed(&self, location: &LocationId, surface: &SurfaceId, now: DateTime<Utc>) {
        let mut locations = self.locations.write().await;
        if let Some(state) = locations.get_mut(location) {
            if let Some(tracked) = state.surfaces.iter_mut().find(|s| &s.surface == surface) {
                tracked.last_pushed_at = Some(now);
            }
            // A successful bot push counts as location activity.
            if self
                .config
                .policy_for(location.as_str())
                .inactivity_timeout()
                .is_some()
            {
                state.last_activity_at = now;
            }
        }
    }

    async fn untrack(&self, location: &LocationId, surface: &SurfaceId) {
        let mut locations = self.locations.write().await;
        let mut location_empty = false;
        if let Some(state) = locations.get_mut(location) {
            state.surfaces.retain(|s| &s.surface != surface);
            location_empty = state.surfaces.is_empty();
        }
        if location_empty {
            locations.remove(location);
        }
    }
}
