//! Per-server tool and capture metrics
//!
//! One [`MetricsStore`] is created with each server instance and handed to the tools that
//! report into it; there is no process-wide registry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::capture::{CaptureReport, ChannelCounts};
use crate::locator::Strategy;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCounters {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ToolCounters {
    pub fn average_ms(&self) -> u64 {
        self.total_ms.checked_div(self.calls).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTotals {
    pub sessions: u64,
    pub resources: u64,
    pub hls: u64,
    pub dash: u64,
    pub direct: u64,
    pub other: u64,
    pub channel_counts: ChannelCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub tools: BTreeMap<String, ToolCounters>,
    pub captures: CaptureTotals,
    /// Successful locates per strategy name
    pub locator_strategies: BTreeMap<String, u64>,
    pub locator_misses: u64,
}

#[derive(Debug, Default)]
struct Inner {
    tools: BTreeMap<String, ToolCounters>,
    captures: CaptureTotals,
    locator_strategies: BTreeMap<String, u64>,
    locator_misses: u64,
}

#[derive(Debug)]
pub struct MetricsStore {
    started_at: DateTime<Utc>,
    started: Instant,
    inner: Mutex<Inner>,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn record_call(&self, tool: &str, elapsed: Duration, error: Option<&str>) {
        let mut inner = self.inner.lock();
        let counters = inner.tools.entry(tool.to_string()).or_default();
        counters.calls += 1;
        counters.total_ms += elapsed.as_millis() as u64;
        match error {
            None => counters.successes += 1,
            Some(message) => {
                counters.failures += 1;
                counters.last_error = Some(message.to_string());
            }
        }
    }

    /// `None` records a locate that exhausted every strategy
    pub fn record_locate(&self, strategy: Option<Strategy>) {
        let mut inner = self.inner.lock();
        match strategy {
            Some(strategy) => {
                *inner
                    .locator_strategies
                    .entry(strategy.name().to_string())
                    .or_default() += 1
            }
            None => inner.locator_misses += 1,
        }
    }

    pub fn record_capture(&self, report: &CaptureReport) {
        let mut inner = self.inner.lock();
        let totals = &mut inner.captures;
        let kinds = &report.resources_by_kind;
        totals.sessions += 1;
        totals.resources += report.total() as u64;
        totals.hls += kinds.hls.len() as u64;
        totals.dash += kinds.dash.len() as u64;
        totals.direct += kinds.direct.len() as u64;
        totals.other += kinds.other.len() as u64;
        totals.channel_counts.network += report.channel_counts.network;
        totals.channel_counts.hooks += report.channel_counts.hooks;
        totals.channel_counts.dom_mutation += report.channel_counts.dom_mutation;
        totals.channel_counts.player_library += report.channel_counts.player_library;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        MetricsSnapshot {
            started_at: self.started_at,
            uptime_secs: self.started.elapsed().as_secs(),
            tools: inner.tools.clone(),
            captures: inner.captures.clone(),
            locator_strategies: inner.locator_strategies.clone(),
            locator_misses: inner.locator_misses,
        }
    }
}
