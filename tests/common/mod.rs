//! Shared test doubles: a scriptable runtime gateway and a recording
//! surface platform.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use deckhand::config::{
    ContainerSpec, Deckfile, LocationPolicy, Presentation, RefreshSettings, TimeoutClass,
};
use deckhand::error::{GatewayError, SurfaceError};
use deckhand::render::StatusCard;
use deckhand::runtime::{InspectOutcome, InspectReport, ResourceStats, RuntimeGateway};
use deckhand::surface::{LocationId, PushOutcome, SurfaceId, SurfacePlatform};
use deckhand::types::{Capability, ContainerAction};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted behavior for one container, keyed by docker name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scripted {
    Running,
    Stopped,
    NotFound,
    Fail,
}

pub struct StubGateway {
    states: Mutex<HashMap<String, Scripted>>,
    act_failures: Mutex<HashMap<String, String>>,
    act_timeouts: Mutex<HashSet<String>>,
    pub act_calls: Mutex<Vec<(String, ContainerAction)>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            act_failures: Mutex::new(HashMap::new()),
            act_timeouts: Mutex::new(HashSet::new()),
            act_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn timeout_actions(&self, docker_name: &str) {
        self.act_timeouts
            .lock()
            .unwrap()
            .insert(docker_name.to_string());
    }

    pub fn set_state(&self, docker_name: &str, state: Scripted) {
        self.states
            .lock()
            .unwrap()
            .insert(docker_name.to_string(), state);
    }

    pub fn fail_actions(&self, docker_name: &str, reason: &str) {
        self.act_failures
            .lock()
            .unwrap()
            .insert(docker_name.to_string(), reason.to_string());
    }

    pub fn acted(&self) -> Vec<(String, ContainerAction)> {
        self.act_calls.lock().unwrap().clone()
    }

    fn state_of(&self, docker_name: &str) -> Scripted {
        self.states
            .lock()
            .unwrap()
            .get(docker_name)
            .copied()
            .unwrap_or(Scripted::Stopped)
    }
}

#[async_trait]
impl RuntimeGateway for StubGateway {
    async fn inspect(&self, container: &str) -> Result<InspectOutcome, GatewayError> {
        match self.state_of(container) {
            Scripted::Running => Ok(InspectOutcome::Present(InspectReport {
                running: true,
                started_at: Some(Utc::now() - Duration::hours(3)),
            })),
            Scripted::Stopped => Ok(InspectOutcome::Present(InspectReport {
                running: false,
                started_at: None,
            })),
            Scripted::NotFound => Ok(InspectOutcome::NotFound),
            Scripted::Fail => Err(GatewayError::Timeout {
                container: container.to_string(),
                seconds: 6,
            }),
        }
    }

    async fn stats(&self, container: &str) -> Result<ResourceStats, GatewayError> {
        match self.state_of(container) {
            Scripted::Running => Ok(ResourceStats {
                cpu: "2%".to_string(),
                memory: "50MiB".to_string(),
            }),
            _ => Err(GatewayError::Unavailable {
                reason: "not running".to_string(),
            }),
        }
    }

    async fn act(&self, container: &str, action: ContainerAction) -> Result<(), GatewayError> {
        self.act_calls
            .lock()
            .unwrap()
            .push((container.to_string(), action));

        if self.act_timeouts.lock().unwrap().contains(container) {
            return Err(GatewayError::Timeout {
                container: container.to_string(),
                seconds: 30,
            });
        }
        if let Some(reason) = self.act_failures.lock().unwrap().get(container) {
            return Err(GatewayError::ActionFailed {
                container: container.to_string(),
                action: action.as_str().to_string(),
                reason: reason.clone(),
            });
        }
        Ok(())
    }
}

/// Surface platform that records everything and can be told to report a
/// surface as gone.
pub struct RecordingSurface {
    counter: AtomicUsize,
    pub created: Mutex<Vec<(LocationId, SurfaceId, StatusCard)>>,
    pub pushes: Mutex<Vec<(SurfaceId, StatusCard)>>,
    pub deletes: Mutex<Vec<LocationId>>,
    dead: Mutex<HashSet<SurfaceId>>,
    last_message_is_own: Mutex<bool>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            dead: Mutex::new(HashSet::new()),
            last_message_is_own: Mutex::new(false),
        }
    }

    pub fn mark_dead(&self, surface: &SurfaceId) {
        self.dead.lock().unwrap().insert(surface.clone());
    }

    pub fn set_last_message_is_own(&self, own: bool) {
        *self.last_message_is_own.lock().unwrap() = own;
    }

    pub fn created_surfaces(&self) -> Vec<SurfaceId> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|(_, id, _)| id.clone())
            .collect()
    }

    pub fn pushes_to(&self, surface: &SurfaceId) -> Vec<StatusCard> {
        self.pushes
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == surface)
            .map(|(_, card)| card.clone())
            .collect()
    }
}

#[async_trait]
impl SurfacePlatform for RecordingSurface {
    async fn push(&self, surface: &SurfaceId, card: &StatusCard) -> PushOutcome {
        if self.dead.lock().unwrap().contains(surface) {
            return PushOutcome::NotFound;
        }
        self.pushes
            .lock()
            .unwrap()
            .push((surface.clone(), card.clone()));
        PushOutcome::Ok
    }

    async fn create(
        &self,
        location: &LocationId,
        card: &StatusCard,
    ) -> Result<SurfaceId, SurfaceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let surface = SurfaceId::new(format!("surface-{n}"));
        self.created
            .lock()
            .unwrap()
            .push((location.clone(), surface.clone(), card.clone()));
        Ok(surface)
    }

    async fn delete_bot_content(
        &self,
        location: &LocationId,
        _limit: usize,
    ) -> Result<usize, SurfaceError> {
        self.deletes.lock().unwrap().push(location.clone());
        Ok(0)
    }

    async fn last_message_is_own(&self, _location: &LocationId) -> Result<bool, SurfaceError> {
        Ok(*self.last_message_is_own.lock().unwrap())
    }
}

/// A two-container fleet with a control location ("ops") and a
/// status-only location ("lobby").
pub fn test_config() -> Deckfile {
    let mut locations = HashMap::new();
    locations.insert(
        "ops".to_string(),
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
            post_initial: false,
            ..LocationPolicy::default()
        },
    );

    Deckfile {
        project: "test-fleet".to_string(),
        presentation: Presentation::default(),
        containers: vec![
            ContainerSpec {
                name: "web".to_string(),
                docker_name: "web-1".to_string(),
                allowed_actions: ContainerAction::ALL.to_vec(),
                allow_detailed_status: true,
                timeout_class: TimeoutClass::Light,
            },
            ContainerSpec {
                name: "db".to_string(),
                docker_name: "db-1".to_string(),
                allowed_actions: vec![ContainerAction::Start],
                allow_detailed_status: false,
                timeout_class: TimeoutClass::Standard,
            },
        ],
        order: vec!["web".to_string(), "db".to_string()],
        locations,
        location_defaults: LocationPolicy::default(),
        refresh: RefreshSettings::default(),
        heartbeat: None,
    }
}
