use crate::types::{ContainerAction, ContainerId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// How long a container may display as "pending" before the tracker
/// gives up and force-clears the state. Independent of gateway call
/// timeouts: this bounds the UI, not the runtime.
pub const PENDING_TIMEOUT_SECS: i64 = 120;

fn pending_timeout() -> Duration {
    Duration::seconds(PENDING_TIMEOUT_SECS)
}

/// A requested action whose effect has not been confirmed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub id: ContainerId,
    pub action: ContainerAction,
    pub requested_at: DateTime<Utc>,
    pub requested_by: String,
}

impl PendingAction {
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        now - self.requested_at >= pending_timeout()
    }
}

/// What a reconciliation pass decided for one container.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Nothing was pending.
    Idle,
    /// Observed state matches the action's expected end-state; cleared.
    Resolved(ContainerAction),
    /// Timeout window exhausted without confirmation; force-cleared.
    TimedOut(ContainerAction),
    /// Still inside the window, end-state not reached yet.
    StillPending,
}

/// Per-container state machine: `NONE → PENDING → (RESOLVED | TIMED_OUT) → NONE`.
///
/// At most one pending action per container; a second request while one
/// is in flight is rejected by the dispatcher, not queued.
pub struct PendingTracker {
    inner: RwLock<HashMap<ContainerId, PendingAction>>,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Transition `NONE → PENDING`. Fails with the existing entry when
    /// an action is already in flight for this container.
    pub async fn begin(
        &self,
        id: ContainerId,
        action: ContainerAction,
        requested_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<PendingAction, PendingAction> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.get(&id) {
            return Err(existing.clone());
        }

        let pending = PendingAction {
            id: id.clone(),
            action,
            requested_at: now,
            requested_by: requested_by.into(),
        };
        inner.insert(id, pending.clone());
        Ok(pending)
    }

    pub async fn get(&self, id: &ContainerId) -> Option<PendingAction> {
        self.inner.read().await.get(id).cloned()
    }

    /// Ids with a pending action still inside its window.
    pub async fn active_ids(&self, now: DateTime<Utc>) -> std::collections::HashSet<ContainerId> {
        self.inner
            .read()
            .await
            .values()
            .filter(|pending| !pending.timed_out(now))
            .map(|pending| pending.id.clone())
            .collect()
    }

    /// Immediate clear, used when the gateway reports definitive failure.
    pub async fn clear(&self, id: &ContainerId) -> Option<PendingAction> {
        self.inner.write().await.remove(id)
    }

    /// Reconcile pending state for `id` against an observed running state.
    /// Called on every status read that produced fresh data.
    pub async fn reconcile(
        &self,
        id: &ContainerId,
        observed_running: bool,
        now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut inner = self.inner.write().await;

        let Some(pending) = inner.get(id) else {
            return ReconcileOutcome::Idle;
        };

        if observed_running == pending.action.expected_running() {
            let action = pending.action;
            inner.remove(id);
            info!("'{id}' {action} confirmed by observed state, pending cleared");
            return ReconcileOutcome::Resolved(action);
        }

        if pending.timed_out(now) {
            let action = pending.action;
            inner.remove(id);
            warn!(
                "'{id}' {action} did not reach its expected state within {PENDING_TIMEOUT_SECS}s, force-clearing pending state"
            );
            return ReconcileOutcome::TimedOut(action);
        }

        ReconcileOutcome::StillPending
    }

    /// Force-clear every entry past the timeout window. Covers containers
    /// whose fetches keep failing and therefore never get reconciled.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Vec<PendingAction> {
        let mut inner = self.inner.write().await;
        let expired_ids: Vec<ContainerId> = inner
            .iter()
            .filter(|(_, pending)| pending.timed_out(now))
            .map(|(id, _)| id.clone())
            .collect();

        let mut expired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(pending) = inner.remove(&id) {
                warn!(
                    "'{}' {} pending state expired without confirmation, force-clearing",
                    pending.id, pending.action
                );
                expired.push(pending);
            }
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for PendingTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn second_action_is_rejected_while_pending() {
        let tracker = PendingTracker::new();
        let id = ContainerId::from("web");
        let now = Utc::now();

        tracker
            .begin(id.clone(), ContainerAction::Stop, "alice", now)
            .await
            .unwrap();

        let existing = tracker
            .begin(id, ContainerAction::Start, "bob", now)
            .await
            .unwrap_err();
        assert_eq!(existing.action, ContainerAction::Stop);
        assert_eq!(existing.requested_by, "alice");
    }

    #[tokio::test]
    async fn reconcile_resolves_on_expected_state() {
        let tracker = PendingTracker::new();
        let id = ContainerId::from("web");
        let now = Utc::now();

        tracker
            .begin(id.clone(), ContainerAction::Stop, "alice", now)
            .await
            .unwrap();

        // Still running: stop not confirmed yet.
        assert_eq!(
            tracker.reconcile(&id, true, now + TimeDelta::seconds(5)).await,
            ReconcileOutcome::StillPending
        );
        // Stopped: confirmed, cleared.
        assert_eq!(
            tracker.reconcile(&id, false, now + TimeDelta::seconds(10)).await,
            ReconcileOutcome::Resolved(ContainerAction::Stop)
        );
        assert!(tracker.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn reconcile_force_clears_after_timeout() {
        let tracker = PendingTracker::new();
        let id = ContainerId::from("web");
        let now = Utc::now();

        tracker
            .begin(id.clone(), ContainerAction::Start, "alice", now)
            .await
            .unwrap();

        let later = now + TimeDelta::seconds(PENDING_TIMEOUT_SECS + 1);
        assert_eq!(
            tracker.reconcile(&id, false, later).await,
            ReconcileOutcome::TimedOut(ContainerAction::Start)
        );
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn restart_resolves_on_running() {
        let tracker = PendingTracker::new();
        let id = ContainerId::from("web");
        let now = Utc::now();

        tracker
            .begin(id.clone(), ContainerAction::Restart, "alice", now)
            .await
            .unwrap();

        assert_eq!(
            tracker.reconcile(&id, true, now + TimeDelta::seconds(3)).await,
            ReconcileOutcome::Resolved(ContainerAction::Restart)
        );
    }

    #[tokio::test]
    async fn expire_stale_only_touches_timed_out_entries() {
        let tracker = PendingTracker::new();
        let now = Utc::now();

        tracker
            .begin(ContainerId::from("old"), ContainerAction::Stop, "alice", now)
            .await
            .unwrap();
        tracker
            .begin(
                ContainerId::from("fresh"),
                ContainerAction::Stop,
                "alice",
                now + TimeDelta::seconds(100),
            )
            .await
            .unwrap();

        let expired = tracker
            .expire_stale(now + TimeDelta::seconds(PENDING_TIMEOUT_SECS + 10))
            .await;

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, ContainerId::from("old"));
        assert_eq!(tracker.len().await, 1);
    }
}
