use super::{probe, FetchOutcome, GenerationSnapshot, PendingTracker, StatusCache};
use crate::config::Deckfile;
use crate::error::Result;
use crate::monitoring::FetchMonitor;
use crate::runtime::RuntimeGateway;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Fixed-interval background sweep over all configured containers.
///
/// Fetches fan out concurrently so one slow container cannot poison the
/// rest; individual failures are logged and skipped (stale-retain), and
/// the loop itself is guarded so a bad cycle never stops the schedule.
pub struct RefreshScheduler {
    config: Arc<Deckfile>,
    gateway: Arc<dyn RuntimeGateway>,
    cache: Arc<StatusCache>,
    pending: Arc<PendingTracker>,
    monitor: Arc<FetchMonitor>,
}

impl RefreshScheduler {
    pub fn new(
        config: Arc<Deckfile>,
        gateway: Arc<dyn RuntimeGateway>,
        cache: Arc<StatusCache>,
        pending: Arc<PendingTracker>,
        monitor: Arc<FetchMonitor>,
    ) -> Self {
        Self {
            config,
            gateway,
            cache,
            pending,
            monitor,
        }
    }

    /// Run the sweep loop forever. Intended for `tokio::spawn`.
    pub async fn run(self: Arc<Self>) {
        let period = self.config.refresh.poll_interval();
        info!(
            "🔄 Starting status refresh loop ({}s period, {} containers)",
            period.as_secs(),
            self.config.containers.len()
        );

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.sweep().await {
                error!("Status sweep failed, will retry next tick: {e:#}");
            }
        }
    }

    /// One full pass over all configured containers.
    pub async fn sweep(&self) -> Result<Arc<GenerationSnapshot>> {
        let fetches = self.config.containers.iter().map(|spec| {
            let gateway = Arc::clone(&self.gateway);
            async move {
                // The originating timestamp travels with the write so a
                // slow early fetch cannot overwrite a fast later one.
                let fetched_at = Utc::now();
                let started = Instant::now();
                let outcome = probe(gateway.as_ref(), spec).await;
                (spec, fetched_at, outcome, started.elapsed())
            }
        });

        let results = join_all(fetches).await;

        let mut updated = 0usize;
        let mut failed = 0usize;

        for (spec, fetched_at, outcome, elapsed) in results {
            let id = spec.id();
            self.monitor.record(&id, elapsed).await;

            match outcome {
                FetchOutcome::TransientError(reason) => {
                    warn!("Fetch for '{id}' failed ({reason}), keeping cached entry");
                    failed += 1;
                }
                outcome => {
                    if let Some(snapshot) = outcome.into_cacheable(spec) {
                        let running = snapshot.running;
                        self.cache.put(snapshot, fetched_at).await;
                        self.pending.reconcile(&id, running, Utc::now()).await;
                        updated += 1;
                    }
                }
            }
        }

        // Containers whose fetches keep failing never reach reconcile;
        // make sure their pending state still cannot outlive the window.
        self.pending.expire_stale(Utc::now()).await;

        let generation = self.cache.publish_generation(Utc::now()).await;
        debug!(
            "Status sweep finished: {updated} updated, {failed} failed, {} cached",
            generation.entries.len()
        );

        Ok(generation)
    }
}
