//! User-initiated container actions: validate, mark pending, fire the
//! gateway call detached from the caller's response path, and keep the
//! pending tracker honest about what actually happened.

use crate::config::{ContainerSpec, Deckfile};
use crate::error::GatewayError;
use crate::render::{RenderContext, RenderEngine};
use crate::runtime::RuntimeGateway;
use crate::status::{probe, PendingTracker, StatusCache};
use crate::surface::{LocationId, PushOutcome, SurfaceId, SurfacePlatform};
use crate::types::{Capability, ContainerAction, ContainerId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where a dispatch request came from; decides the capability check.
#[derive(Debug, Clone)]
pub enum DispatchOrigin {
    /// A user acting through a display surface.
    Surface {
        location: LocationId,
        surface: Option<SurfaceId>,
    },
    /// The task scheduler; always permitted to control.
    Automation,
}

/// Synchronous rejections. None of these mutate any state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchRejection {
    #[error("This location may not control containers")]
    PermissionDenied,

    #[error("Action '{action}' is not allowed for container '{container}'")]
    ActionNotAllowed {
        container: ContainerId,
        action: ContainerAction,
    },

    #[error("An action ({action}) is already in progress for container '{container}'")]
    ActionInProgress {
        container: ContainerId,
        action: ContainerAction,
    },

    #[error("Unknown container: '{name}'")]
    UnknownContainer { name: String },
}

/// Acknowledgement that an action was accepted and is now pending.
#[derive(Debug, Clone)]
pub struct DispatchAck {
    pub container: ContainerId,
    pub action: ContainerAction,
    pub requested_at: DateTime<Utc>,
}

pub struct ActionDispatcher {
    config: Arc<Deckfile>,
    gateway: Arc<dyn RuntimeGateway>,
    cache: Arc<StatusCache>,
    pending: Arc<PendingTracker>,
    engine: Arc<RenderEngine>,
    platform: Arc<dyn SurfacePlatform>,
}

impl ActionDispatcher {
    pub fn new(
        config: Arc<Deckfile>,
        gateway: Arc<dyn RuntimeGateway>,
        cache: Arc<StatusCache>,
        pending: Arc<PendingTracker>,
        engine: Arc<RenderEngine>,
        platform: Arc<dyn SurfacePlatform>,
    ) -> Self {
        Self {
            config,
            gateway,
            cache,
            pending,
            engine,
            platform,
        }
    }

    /// Accept or reject an action request.
    ///
    /// On acceptance the pending state is created, the originating
    /// surface gets a best-effort pending card, and the gateway call runs
    /// detached: its completion updates the cache and pending tracker,
    /// never the caller.
    pub async fn dispatch(
        self: &Arc<Self>,
        id: &ContainerId,
        action: ContainerAction,
        requester: &str,
        origin: &DispatchOrigin,
    ) -> Result<DispatchAck, DispatchRejection> {
        let spec = self
            .config
            .container(id)
            .ok_or_else(|| DispatchRejection::UnknownContainer {
                name: id.to_string(),
            })?;

        let permitted = match origin {
            DispatchOrigin::Surface { location, .. } => self
                .config
                .location_allows(location.as_str(), Capability::Control),
            DispatchOrigin::Automation => true,
        };
        if !permitted {
            return Err(DispatchRejection::PermissionDenied);
        }

        if !spec.allows(action) {
            return Err(DispatchRejection::ActionNotAllowed {
                container: id.clone(),
                action,
            });
        }

        let now = Utc::now();
        let pending = self
            .pending
            .begin(id.clone(), action, requester, now)
            .await
            .map_err(|existing| DispatchRejection::ActionInProgress {
                container: id.clone(),
                action: existing.action,
            })?;

        info!("🎬 {action} requested for '{id}' by {requester}");

        // Immediate pending feedback at the originating surface;
        // a failed push is logged, never fatal.
        if let DispatchOrigin::Surface {
            surface: Some(surface),
            ..
        } = origin
        {
            let card =
                self.engine
                    .render(Some(spec), None, Some(&pending), &RenderContext::default(), now);
            match self.platform.push(surface, &card).await {
                PushOutcome::Ok => {}
                outcome => debug!("Pending push to '{surface}' skipped: {outcome:?}"),
            }
        }

        let this = Arc::clone(self);
        let spec = spec.clone();
        let origin = origin.clone();
        tokio::spawn(async move {
            this.complete(spec, action, origin).await;
        });

        Ok(DispatchAck {
            container: id.clone(),
            action,
            requested_at: now,
        })
    }

    /// Observe the detached gateway call and fold its result back into
    /// the cache and pending tracker.
    async fn complete(&self, spec: ContainerSpec, action: ContainerAction, origin: DispatchOrigin) {
        let id = spec.id();

        match self.gateway.act(&spec.docker_name, action).await {
            Ok(()) => {
                debug!("Gateway accepted {action} for '{id}'");
                // Container state transitions take real time: pending
                // stays until a status read confirms the end-state.
                self.refresh_after_action(&spec, &origin).await;
            }
            Err(GatewayError::Timeout { seconds, .. }) => {
                // Not proof of failure. Leave pending for reconciliation
                // on a later sweep.
                warn!("{action} for '{id}' timed out after {seconds}s, awaiting reconciliation");
            }
            Err(e) => {
                warn!("{action} for '{id}' failed: {e}");
                self.pending.clear(&id).await;
                self.push_failure_notice(&id, action, &e.to_string(), &origin)
                    .await;
            }
        }
    }

    async fn refresh_after_action(&self, spec: &ContainerSpec, origin: &DispatchOrigin) {
        let id = spec.id();
        let fetched_at = Utc::now();
        let outcome = probe(self.gateway.as_ref(), spec).await;

        if let Some(snapshot) = outcome.into_cacheable(spec) {
            let running = snapshot.running;
            self.cache.put(snapshot, fetched_at).await;
            self.pending.reconcile(&id, running, Utc::now()).await;
        }

        if let DispatchOrigin::Surface {
            surface: Some(surface),
            location,
        } = origin
        {
            let ctx = RenderContext {
                expanded: false,
                allow_controls: self
                    .config
                    .location_allows(location.as_str(), Capability::Control),
                allow_toggle: self
                    .config
                    .location_allows(location.as_str(), Capability::Control),
            };
            let entry = self.cache.get(&id).await;
            let pending = self.pending.get(&id).await;
            let card = self
                .engine
                .render(Some(spec), entry.as_ref(), pending.as_ref(), &ctx, Utc::now());
            match self.platform.push(surface, &card).await {
                PushOutcome::Ok => {}
                outcome => debug!("Post-action push to '{surface}' skipped: {outcome:?}"),
            }
        }
    }

    async fn push_failure_notice(
        &self,
        id: &ContainerId,
        action: ContainerAction,
        reason: &str,
        origin: &DispatchOrigin,
    ) {
        if let DispatchOrigin::Surface {
            surface: Some(surface),
            ..
        } = origin
        {
            let card = self.engine.failure_notice(id, action, reason);
            match self.platform.push(surface, &card).await {
                PushOutcome::Ok => {}
                outcome => debug!("Failure notice push to '{surface}' skipped: {outcome:?}"),
            }
        }
    }
}
