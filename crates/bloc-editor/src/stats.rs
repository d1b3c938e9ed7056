//! Drag performance and outcome counters.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DragStats {
    pub drags_started: u64,
    pub drops_attempted: u64,
    pub drops_succeeded: u64,
    pub drops_rejected: u64,
    pub drops_failed: u64,
    pub recoveries: u64,
    /// Frames processed while a drag was in flight.
    pub frames: u64,
    /// Total time spent in the Dragging state.
    pub drag_time_ms: f64,
}

impl DragStats {
    /// Frames per second averaged over all drag time, 0 before any drag.
    pub fn average_fps(&self) -> f64 {
        if self.drag_time_ms <= 0.0 {
            return 0.0;
        }
        self.frames as f64 * 1000.0 / self.drag_time_ms
    }

    /// Fraction of attempted drops that succeeded, 0 before any drop.
    pub fn success_rate(&self) -> f64 {
        if self.drops_attempted == 0 {
            return 0.0;
        }
        self.drops_succeeded as f64 / self.drops_attempted as f64
    }

    pub fn report(&self) -> StatsReport {
        StatsReport {
            counters: *self,
            average_fps: self.average_fps(),
            success_rate: self.success_rate(),
        }
    }
}

/// Counters plus derived rates, as handed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    #[serde(flatten)]
    pub counters: DragStats,
    pub average_fps: f64,
    pub success_rate: f64,
}
