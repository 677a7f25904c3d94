//! Prometheus metrics for the Scoreline server.
//!
//! This module provides:
//! - Cache metrics (hit/miss by tier, memory-tier entries)
//! - Scoring pipeline metrics (task outcomes, duration, queue depth)
//! - Leaderboard and invalidation metrics
//! - Cache health alerts
//! - Event publish outcomes

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "scoreline_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "scoreline_cache_misses_total";
    pub const CACHE_ENTRIES: &str = "scoreline_cache_entries";
    pub const CACHE_ALERTS_TOTAL: &str = "scoreline_cache_alerts_total";

    // Scoring metrics
    pub const SCORING_TASKS_TOTAL: &str = "scoreline_scoring_tasks_total";
    pub const SCORING_DURATION_SECONDS: &str = "scoreline_scoring_duration_seconds";
    pub const SCORING_QUEUE_DEPTH: &str = "scoreline_scoring_queue_depth";

    // Leaderboard metrics
    pub const LEADERBOARD_REQUESTS_TOTAL: &str = "scoreline_leaderboard_requests_total";
    pub const INVALIDATIONS_TOTAL: &str = "scoreline_invalidations_total";

    // Event bus metrics
    pub const EVENTS_PUBLISHED_TOTAL: &str = "scoreline_events_published_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Record a cache hit in the given tier (`memory` or `remote`).
pub fn record_cache_hit(tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

pub fn set_cache_entries(entries: usize) {
    gauge!(names::CACHE_ENTRIES).set(entries as f64);
}

pub fn record_cache_alert(level: &'static str) {
    counter!(names::CACHE_ALERTS_TOTAL, "level" => level).increment(1);
}

// =============================================================================
// Scoring Metrics
// =============================================================================

/// Record a scoring task transition (`queued`, `rejected`, `completed`, `failed`).
pub fn record_scoring_task(outcome: &'static str) {
    counter!(names::SCORING_TASKS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_scoring_duration(duration: Duration) {
    histogram!(names::SCORING_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn set_scoring_queue_depth(depth: usize) {
    gauge!(names::SCORING_QUEUE_DEPTH).set(depth as f64);
}

// =============================================================================
// Leaderboard Metrics
// =============================================================================

pub fn record_leaderboard_request(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(names::LEADERBOARD_REQUESTS_TOTAL, "result" => result).increment(1);
}

/// Record an invalidation (`points`, `match`, `scheduled`, `batch`).
pub fn record_invalidation(kind: &'static str) {
    counter!(names::INVALIDATIONS_TOTAL, "kind" => kind).increment(1);
}

// =============================================================================
// Event Metrics
// =============================================================================

/// Record a publish attempt (`published`, `dropped`, `rejected`).
pub fn record_event_publish(event_type: &'static str, outcome: &'static str) {
    counter!(names::EVENTS_PUBLISHED_TOTAL, "event_type" => event_type, "outcome" => outcome)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_cache_hit("memory");
        record_cache_miss();
        record_scoring_task("completed");
        record_scoring_duration(Duration::from_millis(5));
        record_leaderboard_request(true);
        record_invalidation("points");
        record_event_publish("points.calculated", "published");
    }

    #[test]
    fn test_render_requires_init() {
        // other tests may have installed the recorder in this process
        if PROMETHEUS_HANDLE.get().is_none() {
            assert!(render_metrics().is_none());
        }
    }
}
