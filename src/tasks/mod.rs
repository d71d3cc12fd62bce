//! Time-based automation: scheduled start/stop/restart tasks routed
//! through the action dispatcher. Storage sits behind [`TaskStore`] so
//! the persistent format stays a collaborator concern.

use crate::config::Deckfile;
use crate::dispatch::{ActionDispatcher, DispatchOrigin};
use crate::types::{ContainerAction, ContainerId};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// When a task fires. All times are UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskCycle {
    Once { at: DateTime<Utc> },
    Daily { at: NaiveTime },
    Weekly { weekday: Weekday, at: NaiveTime },
    Monthly { day: u32, at: NaiveTime },
}

impl TaskCycle {
    /// The first firing time strictly after `after`, or `None` when the
    /// cycle has no further occurrences.
    pub fn next_due(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TaskCycle::Once { at } => (*at > after).then_some(*at),
            TaskCycle::Daily { at } => {
                let candidate = Utc.from_utc_datetime(&after.date_naive().and_time(*at));
                if candidate > after {
                    Some(candidate)
                } else {
                    Some(candidate + chrono::Duration::days(1))
                }
            }
            TaskCycle::Weekly { weekday, at } => {
                let mut date = after.date_naive();
                for _ in 0..8 {
                    if date.weekday() == *weekday {
                        let candidate = Utc.from_utc_datetime(&date.and_time(*at));
                        if candidate > after {
                            return Some(candidate);
                        }
                    }
                    date = date.succ_opt()?;
                }
                None
            }
            TaskCycle::Monthly { day, at } => {
                let (mut year, mut month) = (after.year(), after.month());
                // Months without the requested day are skipped entirely.
                for _ in 0..13 {
                    if let Some(date) = NaiveDate::from_ymd_opt(year, month, *day) {
                        let candidate = Utc.from_utc_datetime(&date.and_time(*at));
                        if candidate > after {
                            return Some(candidate);
                        }
                    }
                    month += 1;
                    if month > 12 {
                        month = 1;
                        year += 1;
                    }
                }
                None
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TaskCycle::Once { at } => format!("once at {}", at.format("%Y-%m-%d %H:%M")),
            TaskCycle::Daily { at } => format!("daily at {}", at.format("%H:%M")),
            TaskCycle::Weekly { weekday, at } => {
                format!("every {weekday} at {}", at.format("%H:%M"))
            }
            TaskCycle::Monthly { day, at } => {
                format!("monthly on day {day} at {}", at.format("%H:%M"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub container: ContainerId,
    pub action: ContainerAction,
    pub cycle: TaskCycle,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    fn anchor(&self) -> DateTime<Utc> {
        self.last_run.unwrap_or(self.created_at)
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.cycle.next_due(self.anchor())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due().is_some_and(|due| due <= now)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Unknown container: '{name}'")]
    UnknownContainer { name: String },

    #[error("Action '{action}' is not allowed for container '{container}'")]
    ActionNotAllowed {
        container: ContainerId,
        action: ContainerAction,
    },

    #[error("Another task for '{container}' already fires in the same minute")]
    TimeCollision { container: ContainerId },

    #[error("No task with id {id}")]
    NotFound { id: Uuid },
}

/// Persistence seam for scheduled tasks. The on-disk format is an
/// external collaborator's concern; this crate ships an in-memory store.
pub trait TaskStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Vec<ScheduledTask>>;
    fn save(&self, tasks: &[ScheduledTask]) -> anyhow::Result<()>;
}

pub struct InMemoryTaskStore {
    inner: std::sync::Mutex<Vec<ScheduledTask>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn load(&self) -> anyhow::Result<Vec<ScheduledTask>> {
        Ok(self.inner.lock().expect("task store lock poisoned").clone())
    }

    fn save(&self, tasks: &[ScheduledTask]) -> anyhow::Result<()> {
        *self.inner.lock().expect("task store lock poisoned") = tasks.to_vec();
        Ok(())
    }
}

/// Owns the task list and fires due tasks through the dispatcher.
pub struct TaskScheduler {
    config: Arc<Deckfile>,
    dispatcher: Arc<ActionDispatcher>,
    store: Arc<dyn TaskStore>,
    tasks: RwLock<Vec<ScheduledTask>>,
}

impl TaskScheduler {
    pub fn new(
        config: Arc<Deckfile>,
        dispatcher: Arc<ActionDispatcher>,
        store: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            store,
            tasks: RwLock::new(Vec::new()),
        }
    }

    pub async fn load_from_store(&self) -> anyhow::Result<usize> {
        let loaded = self.store.load()?;
        let count = loaded.len();
        *self.tasks.write().await = loaded;
        if count > 0 {
            info!("📅 Loaded {count} scheduled task(s)");
        }
        Ok(count)
    }

    pub async fn add(
        &self,
        container: ContainerId,
        action: ContainerAction,
        cycle: TaskCycle,
        created_by: impl Into<String>,
    ) -> Result<ScheduledTask, TaskError> {
        let spec = self
            .config
            .container(&container)
            .ok_or_else(|| TaskError::UnknownContainer {
                name: container.to_string(),
            })?;
        if !spec.allows(action) {
            return Err(TaskError::ActionNotAllowed { container, action });
        }

        let now = Utc::now();
        let task = ScheduledTask {
            id: Uuid::new_v4(),
            container: container.clone(),
            action,
            cycle,
            created_by: created_by.into(),
            created_at: now,
            last_run: None,
        };

        let mut tasks = self.tasks.write().await;

        // Two tasks firing in the same minute for the same container
        // would race each other through the one-pending-action gate.
        let candidate_due = task.next_due().map(minute_of);
        let collides = tasks.iter().any(|existing| {
            existing.container == container
                && existing.next_due().map(minute_of) == candidate_due
                && candidate_due.is_some()
        });
        if collides {
            return Err(TaskError::TimeCollision { container });
        }

        info!(
            "📅 Scheduled {} for '{}' ({})",
            task.action,
            task.container,
            task.cycle.describe()
        );
        tasks.push(task.clone());
        self.persist(&tasks);

        Ok(task)
    }

    pub async fn remove(&self, id: Uuid) -> Result<ScheduledTask, TaskError> {
        let mut tasks = self.tasks.write().await;
        let index = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(TaskError::NotFound { id })?;
        let removed = tasks.remove(index);
        self.persist(&tasks);
        Ok(removed)
    }

    pub async fn list(&self) -> Vec<ScheduledTask> {
        self.tasks.read().await.clone()
    }

    pub async fn tasks_for(&self, container: &ContainerId) -> Vec<ScheduledTask> {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|t| &t.container == container)
            .cloned()
            .collect()
    }

    /// Run the task loop forever. Intended for `tokio::spawn`.
    pub async fn run(self: Arc<Self>) {
        info!("📅 Starting task scheduler loop (60s tick)");

        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.tick(Utc::now()).await;
        }
    }

    /// Fire everything that is due. Each occurrence is consumed exactly
    /// once: a rejected dispatch is logged, not retried.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let due: Vec<ScheduledTask> = {
            let tasks = self.tasks.read().await;
            tasks.iter().filter(|t| t.is_due(now)).cloned().collect()
        };

        if due.is_empty() {
            return;
        }

        for task in &due {
            let requester = format!("schedule:{}", task.created_by);
            match self
                .dispatcher
                .dispatch(&task.container, task.action, &requester, &DispatchOrigin::Automation)
                .await
            {
                Ok(_) => {
                    info!(
                        "⏰ Scheduled {} dispatched for '{}'",
                        task.action, task.container
                    );
                }
                Err(rejection) => {
                    warn!(
                        "Scheduled {} for '{}' was rejected: {rejection}",
                        task.action, task.container
                    );
                }
            }
        }

        let mut tasks = self.tasks.write().await;
        for task in tasks.iter_mut() {
            if due.iter().any(|d| d.id == task.id) {
                task.last_run = Some(now);
            }
        }
        // One-shot tasks are done after their single occurrence.
        tasks.retain(|t| !(matches!(t.cycle, TaskCycle::Once { .. }) && t.last_run.is_some()));
        self.persist(&tasks);
        debug!("Task tick processed {} due task(s)", due.len());
    }

    fn persist(&self, tasks: &[ScheduledTask]) {
        if let Err(e) = self.store.save(tasks) {
            warn!("Failed to persist scheduled tasks: {e}");
        }
    }
}

/// Truncate to minute precision for collision comparison.
fn minute_of(dt: DateTime<Utc>) -> i64 {
    dt.timestamp() / 60
}
