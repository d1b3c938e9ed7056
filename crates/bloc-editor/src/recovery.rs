//! Stuck-session detection.
//!
//! Two independent checks keep the engine from getting wedged in a drag:
//! a hard timeout measured from session start, and a periodic watchdog
//! that compares the session state with what the pointer actually reports.

use serde::Serialize;
use std::fmt;

/// Why a session was ended without a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryReason {
    Timeout,
    WindowBlur,
    PointerCancel,
    Escape,
    LostCapture,
    /// Watchdog found a session with no pointer held or captured.
    Desynchronized,
    ForceEnd,
}

impl RecoveryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::WindowBlur => "window blur",
            Self::PointerCancel => "pointer cancel",
            Self::Escape => "escape",
            Self::LostCapture => "lost pointer capture",
            Self::Desynchronized => "desynchronized",
            Self::ForceEnd => "force end",
        }
    }
}

impl fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the watchdog can observe about the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionProbe {
    /// A session exists (any state other than Idle).
    pub active: bool,
    /// Last pointer event reported at least one button held.
    pub pointer_held: bool,
    /// The host has not reported a lost pointer capture.
    pub pointer_captured: bool,
    /// Ghost, indicator, lifted marker or scroll lock still present.
    pub leftover_effects: bool,
}

/// A correction the engine must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// End the session and tear down its effects.
    ForceIdle,
    /// No session, but visual effects were left behind.
    ClearLeftovers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogReport {
    pub correction: Correction,
    /// True once corrections happen on consecutive watchdog runs.
    pub repeated: bool,
}

#[derive(Debug, Clone)]
pub struct RecoveryMonitor {
    timeout_ms: f64,
    interval_ms: f64,
    last_run_ms: Option<f64>,
    consecutive: u32,
}

impl RecoveryMonitor {
    pub fn new(timeout_ms: f64, interval_ms: f64) -> Self {
        Self {
            timeout_ms,
            interval_ms,
            last_run_ms: None,
            consecutive: 0,
        }
    }

    /// Whether a session started at `started_ms` has outlived the timeout.
    pub fn timed_out(&self, started_ms: f64, now_ms: f64) -> bool {
        now_ms - started_ms >= self.timeout_ms
    }

    /// Run the watchdog if its interval has elapsed.
    ///
    /// Returns `None` when it is not yet due or everything is consistent.
    pub fn watchdog(&mut self, probe: SessionProbe, now_ms: f64) -> Option<WatchdogReport> {
        if self.last_run_ms.is_some_and(|last| now_ms - last < self.interval_ms) {
            return None;
        }
        self.last_run_ms = Some(now_ms);

        let correction = if probe.active {
            (!probe.pointer_held || !probe.pointer_captured).then_some(Correction::ForceIdle)
        } else {
            probe.leftover_effects.then_some(Correction::ClearLeftovers)
        };

        match correction {
            Some(correction) => {
                self.consecutive += 1;
                Some(WatchdogReport {
                    correction,
                    repeated: self.consecutive >= 2,
                })
            }
            None => {
                self.consecutive = 0;
                None
            }
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stuck() -> SessionProbe {
        SessionProbe {
            active: true,
            pointer_held: false,
            pointer_captured: true,
            leftover_effects: true,
        }
    }

    #[test]
    fn timeout_is_measured_from_session_start() {
        let m = RecoveryMonitor::new(3000.0, 1000.0);
        assert!(!m.timed_out(100.0, 3099.0));
        assert!(m.timed_out(100.0, 3100.0));
    }

    #[test]
    fn watchdog_runs_on_its_interval() {
        let mut m = RecoveryMonitor::new(3000.0, 1000.0);
        assert!(m.watchdog(stuck(), 0.0).is_some());
        assert!(m.watchdog(stuck(), 500.0).is_none());
        assert!(m.watchdog(stuck(), 1000.0).is_some());
    }

    #[test]
    fn healthy_drag_is_left_alone() {
        let mut m = RecoveryMonitor::new(3000.0, 1000.0);
        let healthy = SessionProbe {
            active: true,
            pointer_held: true,
            pointer_captured: true,
            leftover_effects: true,
        };
        assert_eq!(m.watchdog(healthy, 0.0), None);
    }

    #[test]
    fn lost_capture_forces_idle() {
        let mut m = RecoveryMonitor::new(3000.0, 1000.0);
        let probe = SessionProbe {
            pointer_held: true,
            pointer_captured: false,
            ..stuck()
        };
        let report = m.watchdog(probe, 0.0).unwrap();
        assert_eq!(report.correction, Correction::ForceIdle);
        assert!(!report.repeated);
    }

    #[test]
    fn repeats_are_flagged_and_reset_by_a_clean_run() {
        let mut m = RecoveryMonitor::new(3000.0, 1000.0);
        let idle_leftovers = SessionProbe {
            leftover_effects: true,
            ..SessionProbe::default()
        };
        assert!(!m.watchdog(idle_leftovers, 0.0).unwrap().repeated);
        let second = m.watchdog(stuck(), 1000.0).unwrap();
        assert!(second.repeated);
        assert_eq!(m.consecutive(), 2);

        assert_eq!(m.watchdog(SessionProbe::default(), 2000.0), None);
        assert_eq!(m.consecutive(), 0);
    }
}
