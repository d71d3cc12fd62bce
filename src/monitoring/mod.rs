//! Fetch performance monitoring: rolling per-container timings and
//! degradation detection. Observation only; nothing in here makes
//! control decisions.

use crate::types::ContainerId;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

const HISTORY_CAP: usize = 50;
const BASELINE_SAMPLES: usize = 10;
const RECENT_SAMPLES: usize = 5;
const DEGRADATION_FACTOR: f64 = 2.0;

/// A container whose recent fetches run notably slower than its baseline.
#[derive(Debug, Clone)]
pub struct DegradedContainer {
    pub id: ContainerId,
    pub degradation_factor: f64,
    pub recent_avg_ms: f64,
    pub baseline_avg_ms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorSummary {
    pub containers_monitored: usize,
    pub degraded: Vec<DegradedContainer>,
}

/// Rolling fetch-duration history per container.
pub struct FetchMonitor {
    history: RwLock<HashMap<ContainerId, VecDeque<f64>>>,
}

impl FetchMonitor {
    pub fn new() -> Self {
        Self {
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Record one fetch duration and warn when the container has started
    /// answering noticeably slower than it used to.
    pub async fn record(&self, id: &ContainerId, elapsed: Duration) {
        let millis = elapsed.as_secs_f64() * 1000.0;

        let mut history = self.history.write().await;
        let samples = history.entry(id.clone()).or_default();
        samples.push_back(millis);
        if samples.len() > HISTORY_CAP {
            samples.pop_front();
        }

        if let Some((recent, baseline)) = degradation(samples) {
            if recent > baseline * DEGRADATION_FACTOR {
                warn!(
                    "Fetch degradation for '{id}': recent avg {recent:.1}ms vs baseline {baseline:.1}ms ({:.1}x slower)",
                    recent / baseline
                );
            }
        }
    }

    pub async fn summary(&self) -> MonitorSummary {
        let history = self.history.read().await;
        let mut degraded = Vec::new();

        for (id, samples) in history.iter() {
            if let Some((recent, baseline)) = degradation(samples) {
                if recent > baseline * 1.5 {
                    degraded.push(DegradedContainer {
                        id: id.clone(),
                        degradation_factor: recent / baseline,
                        recent_avg_ms: recent,
                        baseline_avg_ms: baseline,
                    });
                }
            }
        }

        MonitorSummary {
            containers_monitored: history.len(),
            degraded,
        }
    }
}

impl Default for FetchMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// (recent average, baseline average) once enough samples exist.
fn degradation(samples: &VecDeque<f64>) -> Option<(f64, f64)> {
    if samples.len() < BASELINE_SAMPLES {
        return None;
    }

    let baseline: f64 =
        samples.iter().take(BASELINE_SAMPLES).sum::<f64>() / BASELINE_SAMPLES as f64;
    let recent: f64 = samples.iter().rev().take(RECENT_SAMPLES).sum::<f64>() / RECENT_SAMPLES as f64;

    if baseline <= 0.0 {
        return None;
    }

    Some((recent, baseline))
}
