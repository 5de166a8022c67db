//! Poll-cycle latency bookkeeping and the sticky throttle decision
//!
//! Any cycle slower than the threshold engages the throttle. It is released
//! only by a fast cycle arriving while the rolling average is below
//! `RELEASE_RATIO * threshold`, so a single fast sample never flips it back.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Cycle duration above which the throttle engages
pub const LATENCY_THRESHOLD_MS: f64 = 800.0;

/// Rolling window size
pub const LATENCY_WINDOW: usize = 10;

/// Alert history cap
pub const MAX_ALERTS: usize = 50;

/// Alerts included in status payloads
pub const RECENT_ALERTS: usize = 5;

/// Fraction of the threshold the average must fall below to release
pub const RELEASE_RATIO: f64 = 0.7;

/// Slow-cycle alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyAlert {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Status view of the monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub average_latency_ms: f64,
    pub last_latency_ms: f64,
    pub throttle_active: bool,
    pub slow_poll_count: u64,
    pub total_poll_count: u64,
    pub threshold_ms: f64,
    pub recent_alerts: Vec<LatencyAlert>,
}

#[derive(Debug, Clone)]
pub struct LatencyMonitor {
    threshold_ms: f64,
    samples: VecDeque<f64>,
    throttle_active: bool,
    slow_poll_count: u64,
    total_poll_count: u64,
    alerts: VecDeque<LatencyAlert>,
}

impl Default for LatencyMonitor {
    fn default() -> Self {
        Self::new(LATENCY_THRESHOLD_MS)
    }
}

impl LatencyMonitor {
    pub fn new(threshold_ms: f64) -> Self {
        Self {
            threshold_ms,
            samples: VecDeque::with_capacity(LATENCY_WINDOW),
            throttle_active: false,
            slow_poll_count: 0,
            total_poll_count: 0,
            alerts: VecDeque::new(),
        }
    }

    /// Record one cycle duration
    pub fn record(&mut self, duration_ms: f64) {
        self.total_poll_count += 1;
        if self.samples.len() == LATENCY_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(duration_ms);

        if duration_ms > self.threshold_ms {
            self.slow_poll_count += 1;
            if !self.throttle_active {
                warn!(
                    "Poll cycle {:.0}ms over {:.0}ms, throttling to group A",
                    duration_ms, self.threshold_ms
                );
            }
            self.throttle_active = true;

            if self.alerts.len() == MAX_ALERTS {
                self.alerts.pop_front();
            }
            self.alerts.push_back(LatencyAlert {
                kind: "MODBUS_LATENCY",
                value: duration_ms,
                timestamp: Utc::now(),
                message: format!(
                    "Poll cycle took {:.0}ms (threshold: {:.0}ms)",
                    duration_ms, self.threshold_ms
                ),
            });
        } else if self.throttle_active && self.average_ms() < self.threshold_ms * RELEASE_RATIO {
            self.throttle_active = false;
            info!(
                "Poll latency recovered (avg {:.1}ms), resuming full polling",
                self.average_ms()
            );
        }
    }

    pub fn average_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn last_ms(&self) -> f64 {
        self.samples.back().copied().unwrap_or(0.0)
    }

    pub fn throttle_active(&self) -> bool {
        self.throttle_active
    }

    pub fn threshold_ms(&self) -> f64 {
        self.threshold_ms
    }

    pub fn alerts(&self) -> impl Iterator<Item = &LatencyAlert> {
        self.alerts.iter()
    }

    pub fn stats(&self) -> LatencyStats {
        let skip = self.alerts.len().saturating_sub(RECENT_ALERTS);
        LatencyStats {
            average_latency_ms: (self.average_ms() * 10.0).round() / 10.0,
            last_latency_ms: self.last_ms(),
            throttle_active: self.throttle_active,
            slow_poll_count: self.slow_poll_count,
            total_poll_count: self.total_poll_count,
            threshold_ms: self.threshold_ms,
            recent_alerts: self.alerts.iter().skip(skip).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slow_cycle_engages_throttle() {
        let mut monitor = LatencyMonitor::default();
        monitor.record(120.0);
        assert!(!monitor.throttle_active());

        monitor.record(900.0);
        assert!(monitor.throttle_active());

        let stats = monitor.stats();
        assert_eq!(stats.slow_poll_count, 1);
        assert_eq!(stats.total_poll_count, 2);
        assert_eq!(stats.recent_alerts.len(), 1);
        assert_eq!(stats.recent_alerts[0].kind, "MODBUS_LATENCY");
        assert_eq!(
            stats.recent_alerts[0].message,
            "Poll cycle took 900ms (threshold: 800ms)"
        );
    }

    #[test]
    fn test_hysteresis_release() {
        let mut monitor = LatencyMonitor::default();
        for _ in 0..3 {
            monitor.record(900.0);
        }
        // avg 700, then 580: still above 560
        monitor.record(100.0);
        assert!(monitor.throttle_active());
        monitor.record(100.0);
        assert!(monitor.throttle_active());
        // avg 500
        monitor.record(100.0);
        assert!(!monitor.throttle_active());
    }

    #[test]
    fn test_fast_sample_alone_does_not_release() {
        let mut monitor = LatencyMonitor::default();
        for _ in 0..LATENCY_WINDOW {
            monitor.record(1000.0);
        }
        monitor.record(10.0);
        assert!(monitor.throttle_active());
        assert!(monitor.average_ms() > LATENCY_THRESHOLD_MS * RELEASE_RATIO);
    }

    #[test]
    fn test_window_and_alert_caps() {
        let mut monitor = LatencyMonitor::default();
        for i in 0..60 {
            monitor.record(801.0 + f64::from(i));
        }
        assert_eq!(monitor.alerts().count(), MAX_ALERTS);
        let stats = monitor.stats();
        assert_eq!(stats.recent_alerts.len(), RECENT_ALERTS);
        assert_eq!(stats.recent_alerts[4].value, 860.0);
        assert_eq!(stats.last_latency_ms, 860.0);
        // window holds the last 10: 851..=860
        assert_eq!(stats.average_latency_ms, 855.5);
    }
}
