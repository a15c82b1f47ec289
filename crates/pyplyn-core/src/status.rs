//! Named counters and timers, plus the threshold-driven alert monitor.
//!
//! Everything here is side-effect-free to the rest of the system: processors
//! mark meters and open timer contexts, the monitor only reads snapshots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::shutdown::ShutdownSignal;

/// Terminal outcome kinds tracked per processor meter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterKind {
    Success,
    Failure,
    NoData,
    AuthenticationFailure,
}

impl MeterKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::NoData => "no_data",
            Self::AuthenticationFailure => "authentication_failure",
        }
    }
}

/// Handle to one named counter.
#[derive(Debug, Clone)]
pub struct Meter(Arc<AtomicU64>);

impl Meter {
    pub fn mark(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct TimerStats {
    count: AtomicU64,
    total_micros: AtomicU64,
}

/// Timing context; records the elapsed duration when dropped.
pub struct TimerContext {
    stats: Arc<TimerStats>,
    started: Instant,
}

impl Drop for TimerContext {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        self.stats.count.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_micros
            .fetch_add(elapsed.as_micros().min(u128::from(u64::MAX)) as u64, Ordering::Relaxed);
    }
}

/// Thread-safe registry of named meters and timers.
#[derive(Debug, Default)]
pub struct SystemStatus {
    meters: DashMap<(String, MeterKind), Arc<AtomicU64>>,
    timers: DashMap<String, Arc<TimerStats>>,
}

impl SystemStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the meter for `(name, kind)`, creating it on first use.
    pub fn meter(&self, name: &str, kind: MeterKind) -> Meter {
        let counter = self
            .meters
            .entry((name.to_string(), kind))
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        Meter(counter)
    }

    /// Opens a timing context under `<name>.<operation>`; the measurement is
    /// recorded when the context drops.
    pub fn timer(&self, name: &str, operation: &str) -> TimerContext {
        let stats = self
            .timers
            .entry(format!("{name}.{operation}"))
            .or_insert_with(|| Arc::new(TimerStats::default()))
            .clone();
        TimerContext {
            stats,
            started: Instant::now(),
        }
    }

    /// Current counts of every meter that has been touched.
    pub fn meter_counts(&self) -> HashMap<(String, MeterKind), u64> {
        self.meters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// `(count, mean duration)` for a timer, if it has recorded anything.
    pub fn timer_snapshot(&self, name: &str, operation: &str) -> Option<(u64, Duration)> {
        let stats = self.timers.get(&format!("{name}.{operation}"))?;
        let count = stats.count.load(Ordering::Relaxed);
        if count == 0 {
            return None;
        }
        let total = stats.total_micros.load(Ordering::Relaxed);
        Some((count, Duration::from_micros(total / count)))
    }
}

/// One meter that crossed its configured threshold within a check interval.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusAlert {
    pub meter: String,
    pub count: u64,
    pub threshold: f64,
}

/// Periodically compares per-interval meter deltas against configured
/// thresholds and logs the offenders.
///
/// Threshold keys use the form `<meterName>.<kind>`, e.g. `Refocus.failure`.
pub struct StatusMonitor {
    status: Arc<SystemStatus>,
    thresholds: HashMap<String, f64>,
    check_interval: Duration,
    last_counts: HashMap<(String, MeterKind), u64>,
}

impl StatusMonitor {
    pub fn new(
        status: Arc<SystemStatus>,
        thresholds: HashMap<String, f64>,
        check_interval: Duration,
    ) -> Self {
        Self {
            status,
            thresholds,
            check_interval,
            last_counts: HashMap::new(),
        }
    }

    /// Compares meter movement since the previous check against thresholds.
    pub fn check_once(&mut self) -> Vec<StatusAlert> {
        let current = self.status.meter_counts();
        let mut alerts = Vec::new();

        for (key, count) in &current {
            let previous = self.last_counts.get(key).copied().unwrap_or(0);
            let delta = count.saturating_sub(previous);

            let meter = format!("{}.{}", key.0, key.1.as_str());
            if let Some(&threshold) = self.thresholds.get(&meter) {
                if delta as f64 >= threshold {
                    alerts.push(StatusAlert {
                        meter,
                        count: delta,
                        threshold,
                    });
                }
            }
        }

        self.last_counts = current;
        alerts
    }

    /// Runs the monitor until shutdown.
    pub async fn run(mut self, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.check_interval);
        // skip the first immediate tick
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.draining() => break,

                _ = ticker.tick() => {
                    for alert in self.check_once() {
                        tracing::warn!(
                            meter = %alert.meter,
                            count = alert.count,
                            threshold = alert.threshold,
                            "status meter crossed alert threshold"
                        );
                    }
                    debug!("status check completed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meters_accumulate_marks() {
        let status = SystemStatus::new();

        status.meter("Refocus", MeterKind::Success).mark();
        status.meter("Refocus", MeterKind::Success).mark();
        status.meter("Refocus", MeterKind::Failure).mark();

        assert_eq!(status.meter("Refocus", MeterKind::Success).count(), 2);
        assert_eq!(status.meter("Refocus", MeterKind::Failure).count(), 1);
        assert_eq!(status.meter("Refocus", MeterKind::NoData).count(), 0);
    }

    #[test]
    fn timer_records_on_drop() {
        let status = SystemStatus::new();

        assert!(status.timer_snapshot("Refocus", "get-samples.prod").is_none());

        {
            let _timer = status.timer("Refocus", "get-samples.prod");
            std::thread::sleep(Duration::from_millis(5));
        }

        let (count, mean) = status
            .timer_snapshot("Refocus", "get-samples.prod")
            .expect("timer should have recorded");
        assert_eq!(count, 1);
        assert!(mean >= Duration::from_millis(5));
    }

    #[test]
    fn monitor_alerts_on_interval_delta_not_total() {
        let status = Arc::new(SystemStatus::new());
        let thresholds = HashMap::from([(String::from("Refocus.failure"), 3.0)]);
        let mut monitor =
            StatusMonitor::new(Arc::clone(&status), thresholds, Duration::from_secs(60));

        let failures = status.meter("Refocus", MeterKind::Failure);
        failures.mark();
        failures.mark();
        assert!(monitor.check_once().is_empty());

        for _ in 0..3 {
            failures.mark();
        }
        let alerts = monitor.check_once();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].meter, "Refocus.failure");
        assert_eq!(alerts[0].count, 3);

        // no new marks: the next interval is quiet again
        assert!(monitor.check_once().is_empty());
    }

    #[test]
    fn monitor_ignores_meters_without_thresholds() {
        let status = Arc::new(SystemStatus::new());
        let mut monitor =
            StatusMonitor::new(Arc::clone(&status), HashMap::new(), Duration::from_secs(60));

        status.meter("Refocus", MeterKind::Failure).mark();
        assert!(monitor.check_once().is_empty());
    }
}
