use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::config::MonitorConfig;

/// One completed HTTP probe, already classified against the target's
/// timeout and slow threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Success { elapsed_ms: u64 },
    Slow { elapsed_ms: u64 },
    Failed { reason: String },
}

/// Rolling per-target tally for the current reporting window.
///
/// `success + failed == total` and `slow <= success` hold after every
/// `record` call; `flush` zeroes all four fields together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckCounters {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub slow: u64,
}

impl CheckCounters {
    pub fn record(&mut self, outcome: &ProbeOutcome) {
        self.total += 1;
        match outcome {
            ProbeOutcome::Success { .. } => self.success += 1,
            ProbeOutcome::Slow { .. } => {
                self.success += 1;
                self.slow += 1;
            }
            ProbeOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Read-and-reset in one step. Callers hold the state lock, so no
    /// probe result can land between the read and the reset.
    pub fn flush(&mut self) -> CheckCounters {
        std::mem::take(self)
    }
}

/// Connection health of the monitored WebSocket stream. `reconnects`
/// counts successful opens and is never reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsStats {
    pub connected: bool,
    pub reconnects: u64,
    pub last_message_at: DateTime<Utc>,
}

impl WsStats {
    pub fn new() -> Self {
        Self {
            connected: false,
            reconnects: 0,
            last_message_at: Utc::now(),
        }
    }
}

impl Default for WsStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of all mutable monitoring state, keyed by target name.
/// Shared behind an `Arc<Mutex<_>>` between the probe tasks, the
/// WebSocket session, the reporters and the stats API.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorState {
    pub counters: HashMap<String, CheckCounters>,
    pub ws: WsStats,
}

impl MonitorState {
    pub fn new(config: &MonitorConfig) -> Self {
        let counters = config
            .http_targets
            .iter()
            .map(|target| (target.name.clone(), CheckCounters::default()))
            .collect();

        Self {
            counters,
            ws: WsStats::new(),
        }
    }

    pub fn record(&mut self, target_name: &str, outcome: &ProbeOutcome) {
        self.counters
            .entry(target_name.to_string())
            .or_default()
            .record(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_hold_invariants_across_sequences() {
        let mut counters = CheckCounters::default();
        let outcomes = [
            ProbeOutcome::Success { elapsed_ms: 120 },
            ProbeOutcome::Slow { elapsed_ms: 1500 },
            ProbeOutcome::Failed { reason: "timeout".into() },
            ProbeOutcome::Success { elapsed_ms: 80 },
            ProbeOutcome::Failed { reason: "refused".into() },
        ];

        for outcome in &outcomes {
            counters.record(outcome);
            assert_eq!(counters.success + counters.failed, counters.total);
            assert!(counters.slow <= counters.success);
        }

        assert_eq!(counters.total, 5);
        assert_eq!(counters.success, 3);
        assert_eq!(counters.failed, 2);
        assert_eq!(counters.slow, 1);
    }

    #[test]
    fn slow_outcome_increments_success_and_slow() {
        let mut counters = CheckCounters::default();
        counters.record(&ProbeOutcome::Slow { elapsed_ms: 1500 });

        assert_eq!(counters.total, 1);
        assert_eq!(counters.success, 1);
        assert_eq!(counters.slow, 1);
        assert_eq!(counters.failed, 0);
    }

    #[test]
    fn failed_outcome_leaves_success_and_slow_untouched() {
        let mut counters = CheckCounters::default();
        counters.record(&ProbeOutcome::Failed { reason: "timeout".into() });

        assert_eq!(counters.total, 1);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.success, 0);
        assert_eq!(counters.slow, 0);
    }

    #[test]
    fn flush_returns_snapshot_and_zeroes() {
        let mut counters = CheckCounters::default();
        counters.record(&ProbeOutcome::Success { elapsed_ms: 100 });
        counters.record(&ProbeOutcome::Slow { elapsed_ms: 1200 });

        let snapshot = counters.flush();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.success, 2);
        assert_eq!(snapshot.slow, 1);
        assert_eq!(counters, CheckCounters::default());
    }

    #[test]
    fn flush_with_zero_traffic_is_all_zero() {
        let mut counters = CheckCounters::default();
        let snapshot = counters.flush();
        assert_eq!(snapshot, CheckCounters::default());
    }

    #[test]
    fn state_registry_is_keyed_by_target_name() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{
                "http_targets": [
                    { "name": "gateway", "url": "https://a.example.com/alive" },
                    { "name": "api", "url": "https://b.example.com/alive" }
                ]
            }"#,
        )
        .unwrap();

        let mut state = MonitorState::new(&config);
        assert_eq!(state.counters.len(), 2);

        state.record("gateway", &ProbeOutcome::Success { elapsed_ms: 50 });
        assert_eq!(state.counters["gateway"].total, 1);
        assert_eq!(state.counters["api"].total, 0);
    }
}
