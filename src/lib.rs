//! Deckhand - chat-ops control deck for Docker containers
//!
//! This crate provides the status caching, refresh scheduling, pending
//! action tracking and surface coordination core behind a container
//! control bot: poll container state on a fixed cadence, keep stale
//! data alive through runtime hiccups, track in-flight actions until
//! observed state confirms them, and keep every display surface fresh
//! without exceeding its push budget.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod monitoring;
pub mod render;
pub mod runtime;
pub mod status;
pub mod surface;
pub mod tasks;
pub mod types;

pub use config::{ContainerSpec, Deckfile, LocationPolicy};
pub use error::{DeckhandError, Result};

// Export main types at root level
pub use types::{Capability, ContainerAction, ContainerId, ResourceReading, StatusSnapshot};

// Re-export anyhow for compatibility
pub use anyhow;

use crate::dispatch::{ActionDispatcher, DispatchAck, DispatchOrigin, DispatchRejection};
use crate::monitoring::FetchMonitor;
use crate::render::{RenderContext, RenderEngine, StatusCard};
use crate::runtime::RuntimeGateway;
use crate::status::{GenerationSnapshot, PendingTracker, RefreshScheduler, StatusCache};
use crate::surface::{LocationId, RefreshCoordinator, SurfaceId, SurfacePlatform};
use crate::tasks::{InMemoryTaskStore, TaskScheduler, TaskStore};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Composition root: owns every piece of shared state exactly once and
/// wires the background loops together. No ambient globals anywhere;
/// construct one of these per process and pass it around.
pub struct DeckhandCore {
    config: Arc<Deckfile>,
    cache: Arc<StatusCache>,
    pending: Arc<PendingTracker>,
    engine: Arc<RenderEngine>,
    monitor: Arc<FetchMonitor>,
    platform: Arc<dyn SurfacePlatform>,
    dispatcher: Arc<ActionDispatcher>,
    refresher: Arc<RefreshScheduler>,
    coordinator: Arc<RefreshCoordinator>,
    tasks: Arc<TaskScheduler>,
}

impl DeckhandCore {
    pub fn new(
        config: Deckfile,
        gateway: Arc<dyn RuntimeGateway>,
        platform: Arc<dyn SurfacePlatform>,
    ) -> Self {
        Self::with_task_store(config, gateway, platform, Arc::new(InMemoryTaskStore::new()))
    }

    pub fn with_task_store(
        config: Deckfile,
        gateway: Arc<dyn RuntimeGateway>,
        platform: Arc<dyn SurfacePlatform>,
        task_store: Arc<dyn TaskStore>,
    ) -> Self {
        let config = Arc::new(config);
        let cache = Arc::new(StatusCache::new());
        let pending = Arc::new(PendingTracker::new());
        let engine = Arc::new(RenderEngine::new(&config.presentation));
        let monitor = Arc::new(FetchMonitor::new());

        let dispatcher = Arc::new(ActionDispatcher::new(
            Arc::clone(&config),
            Arc::clone(&gateway),
            Arc::clone(&cache),
            Arc::clone(&pending),
            Arc::clone(&engine),
            Arc::clone(&platform),
        ));

        let refresher = Arc::new(RefreshScheduler::new(
            Arc::clone(&config),
            Arc::clone(&gateway),
            Arc::clone(&cache),
            Arc::clone(&pending),
            Arc::clone(&monitor),
        ));

        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&config),
            Arc::clone(&cache),
            Arc::clone(&pending),
            Arc::clone(&engine),
            Arc::clone(&platform),
        ));

        let tasks = Arc::new(TaskScheduler::new(
            Arc::clone(&config),
            Arc::clone(&dispatcher),
            task_store,
        ));

        Self {
            config,
            cache,
            pending,
            engine,
            monitor,
            platform,
            dispatcher,
            refresher,
            coordinator,
            tasks,
        }
    }

    pub fn config(&self) -> &Deckfile {
        &self.config
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    pub fn pending(&self) -> &Arc<PendingTracker> {
        &self.pending
    }

    pub fn monitor(&self) -> &Arc<FetchMonitor> {
        &self.monitor
    }

    pub fn tasks(&self) -> &Arc<TaskScheduler> {
        &self.tasks
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Render the card for one container as it would appear right now.
    pub async fn get_render(&self, id: &ContainerId, ctx: &RenderContext) -> StatusCard {
        let spec = self.config.container(id);
        let entry = self.cache.get(id).await;
        let pending = self.pending.get(id).await;
        self.engine
            .render(spec, entry.as_ref(), pending.as_ref(), ctx, Utc::now())
    }

    /// Validate and dispatch a container action.
    pub async fn dispatch_action(
        &self,
        id: &ContainerId,
        action: ContainerAction,
        requester: &str,
        origin: &DispatchOrigin,
    ) -> std::result::Result<DispatchAck, DispatchRejection> {
        self.dispatcher.dispatch(id, action, requester, origin).await
    }

    /// Flip a surface's detail view and push the update immediately.
    pub async fn toggle_expanded(&self, surface: &SurfaceId) -> Option<StatusCard> {
        self.coordinator.toggle_expanded(surface).await
    }

    /// Record user activity in a location (resets its inactivity clock).
    pub async fn note_user_activity(&self, location: &LocationId) {
        self.coordinator.note_user_activity(location).await;
    }

    /// Run one sweep now and return the published generation. Backs the
    /// one-shot overview command.
    pub async fn force_refresh_all(&self) -> Result<Arc<GenerationSnapshot>> {
        self.refresher.sweep().await
    }

    /// The fleet overview card from the latest published generation.
    pub async fn overview(&self) -> StatusCard {
        let generation = self.cache.generation().await;
        let pending_ids = self.pending.active_ids(Utc::now()).await;
        let order = self.config.ordered_containers();
        self.engine.render_overview(&order, &generation, &pending_ids)
    }

    /// Spawn every background loop. The returned handles live as long as
    /// the process wants them to; abort them to shut down.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!("⚓ Starting Deckhand background loops");

        let mut handles = vec![
            tokio::spawn(Arc::clone(&self.refresher).run()),
            tokio::spawn(Arc::clone(&self.coordinator).run_refresh_loop()),
            tokio::spawn(Arc::clone(&self.coordinator).run_inactivity_loop()),
            tokio::spawn(Arc::clone(&self.tasks).run()),
        ];

        if let Some(heartbeat) = self.config.heartbeat.clone() {
            let beat = surface::Heartbeat::new(heartbeat, Arc::clone(&self.platform));
            handles.push(tokio::spawn(beat.run()));
        }

        // Initial publish: one priming sweep, a short settle delay, then
        // fresh surfaces for every location configured for it.
        let refresher = Arc::clone(&self.refresher);
        let coordinator = Arc::clone(&self.coordinator);
        let delay = std::time::Duration::from_secs(self.config.refresh.initial_send_delay_secs);
        handles.push(tokio::spawn(async move {
            if let Err(e) = refresher.sweep().await {
                tracing::warn!("Priming sweep failed: {e:#}");
            }
            tokio::time::sleep(delay).await;
            coordinator.publish_initial().await;
        }));

        handles
    }
}
