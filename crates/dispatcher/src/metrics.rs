use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

use crate::reassignment::CycleReport;

/// Metrics collector for the reassignment loop
///
/// Handles are registered against the global recorder; without an installed
/// exporter every call is a no-op.
pub struct ReassignmentMetrics {
    cycles_total: Counter,
    cycle_failures_total: Counter,
    cycle_duration: Histogram,
    unassigned_clusters: Gauge,
    assigned_total: Counter,
    no_driver_total: Counter,
    exhausted_total: Counter,
    delivery_missing_total: Counter,
    cluster_failures_total: Counter,
}

impl ReassignmentMetrics {
    pub fn new() -> Self {
        Self {
            cycles_total: counter!("courier_reassignment_cycles_total"),
            cycle_failures_total: counter!("courier_reassignment_cycle_failures_total"),
            cycle_duration: histogram!("courier_reassignment_cycle_duration_seconds"),
            unassigned_clusters: gauge!("courier_reassignment_unassigned_clusters"),
            assigned_total: counter!("courier_reassignment_outcomes_total", "outcome" => "assigned"),
            no_driver_total: counter!("courier_reassignment_outcomes_total", "outcome" => "no_driver"),
            exhausted_total: counter!("courier_reassignment_outcomes_total", "outcome" => "exhausted"),
            delivery_missing_total: counter!(
                "courier_reassignment_outcomes_total",
                "outcome" => "delivery_missing"
            ),
            cluster_failures_total: counter!("courier_reassignment_outcomes_total", "outcome" => "failed"),
        }
    }

    /// Record a completed (possibly interrupted) cycle
    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycles_total.increment(1);
        self.cycle_duration.record(report.duration.as_secs_f64());
        self.unassigned_clusters.set(report.scanned as f64);
        self.assigned_total.increment(report.assigned as u64);
        self.no_driver_total.increment(report.no_driver as u64);
        self.exhausted_total.increment(report.exhausted as u64);
        self.delivery_missing_total
            .increment(report.delivery_missing as u64);
        self.cluster_failures_total.increment(report.failed as u64);
    }

    /// Record a cycle that failed before any cluster was processed
    pub fn record_cycle_failure(&self) {
        self.cycles_total.increment(1);
        self.cycle_failures_total.increment(1);
    }
}

impl Default for ReassignmentMetrics {
    fn default() -> Self {
        Self::new()
    }
}
