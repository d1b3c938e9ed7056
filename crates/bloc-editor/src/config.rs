//! Engine configuration.
//!
//! Every threshold and timer the engine uses lives here so a page (or a
//! test) can construct an engine with its own values. The host may pass
//! a partial JSON object; missing fields keep their defaults.

use bloc_core::BLOC_PREFIX;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Minimum Euclidean pointer travel before a press becomes a drag.
    pub drag_threshold_px: f64,
    /// A session older than this is force-ended by the recovery monitor.
    pub session_timeout_ms: f64,
    /// Watchdog sampling interval.
    pub monitor_interval_ms: f64,
    /// Staleness window for drop-zone bounds snapshots.
    pub zone_cache_ttl_ms: f64,
    /// Lifetime of memoized position results.
    pub position_cache_ttl_ms: f64,
    /// Position cache size that triggers pruning.
    pub position_cache_max: usize,
    /// Toast auto-dismiss delay.
    pub toast_duration_ms: f64,
    /// Interval between periodic operation-queue flushes.
    pub flush_interval_ms: f64,
    /// Pointer distance to a top/bottom edge that favours Before/After.
    pub edge_proximity_px: f64,
    /// Pointer distance to the target center that favours Inside.
    pub inside_proximity_px: f64,
    /// Dominant-axis ratio for classifying internal gestures.
    pub internal_axis_ratio: f64,
    /// Id prefix that marks an element as draggable.
    pub id_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drag_threshold_px: 5.0,
            session_timeout_ms: 3000.0,
            monitor_interval_ms: 1000.0,
            zone_cache_ttl_ms: 200.0,
            position_cache_ttl_ms: 100.0,
            position_cache_max: 100,
            toast_duration_ms: 3000.0,
            flush_interval_ms: 250.0,
            edge_proximity_px: 20.0,
            inside_proximity_px: 50.0,
            internal_axis_ratio: 1.5,
            id_prefix: BLOC_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON config.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
