//! # Running Statistics
//! Process-lifetime request counters, one per decision outcome.
//!
//! Every update and every read takes the same lock, so a snapshot always
//! satisfies `sum(decisions_by_outcome) == total_requests`.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::Decision;

#[derive(Debug)]
struct Inner {
    total_requests: u64,
    by_outcome: BTreeMap<Decision, u64>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Inner {
    fn fresh() -> Self {
        Self {
            total_requests: 0,
            by_outcome: Decision::ALL.into_iter().map(|d| (d, 0)).collect(),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    /// All four outcomes are always present, zero or not.
    pub decisions_by_outcome: BTreeMap<Decision, u64>,
    pub uptime_seconds: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RunningStatistics {
    inner: Mutex<Inner>,
}

impl Default for RunningStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStatistics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::fresh()),
        }
    }

    /// Count one finished analysis.
    pub fn record(&self, decision: Decision) {
        let mut g = self.inner.lock();
        g.total_requests += 1;
        *g.by_outcome.entry(decision).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let g = self.inner.lock();
        StatsSnapshot {
            total_requests: g.total_requests,
            decisions_by_outcome: g.by_outcome.clone(),
            uptime_seconds: g.started.elapsed().as_secs_f64(),
            started_at: g.started_at,
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.inner.lock().total_requests
    }

    /// Zero all counters and restart the uptime clock.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::fresh();
        info!("statistics reset");
    }
}
