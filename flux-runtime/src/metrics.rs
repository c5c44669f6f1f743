//! Metrics/logging (ambient, SPEC_FULL §2): counters via `opentelemetry`,
//! following `tower-shot::service::RateLimitServiceMetrics`'s pattern of a
//! small struct of pre-built instruments pulled from a named `global::meter`
//! at construction time rather than looked up per call. Latency percentiles
//! use `hdrhistogram`, which the teacher does not need (it has no
//! service-time distribution to track) but which the broader pack reaches
//! for whenever request latency itself is the thing being measured.

use hdrhistogram::Histogram;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::{global, KeyValue};
use std::sync::Mutex;

/// One worker's dispatch/admission instruments, built once at worker
/// startup and reused for the worker's lifetime.
#[derive(Clone)]
pub struct WorkerMetrics {
    lc_dispatched: Counter<u64>,
    be_dispatched: Counter<u64>,
    lc_busy_ticks: Counter<u64>,
    cross_worker_donations: Counter<u64>,
    cross_worker_acquisitions: Counter<u64>,
    admission_rejections: Counter<u64>,
    service_time_us: std::sync::Arc<Mutex<Histogram<u64>>>,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        let meter: Meter = global::meter("flux_runtime");
        Self {
            lc_dispatched: meter.u64_counter("flux_lc_dispatched").build(),
            be_dispatched: meter.u64_counter("flux_be_dispatched").build(),
            lc_busy_ticks: meter.u64_counter("flux_lc_busy_ticks").build(),
            cross_worker_donations: meter.u64_counter("flux_cross_worker_donations").build(),
            cross_worker_acquisitions: meter.u64_counter("flux_cross_worker_acquisitions").build(),
            admission_rejections: meter.u64_counter("flux_admission_rejections").build(),
            service_time_us: std::sync::Arc::new(Mutex::new(
                // Track 1us..10s at 3 significant digits, matching the
                // latency ranges the §6.1 SLO fields are expressed in.
                Histogram::new_with_bounds(1, 10_000_000, 3)
                    .expect("fixed histogram bounds are always valid"),
            )),
        }
    }

    pub fn record_tick(&self, worker_id: usize, outcome: &flux_engine::TickOutcome) {
        let tags = &[KeyValue::new("worker_id", worker_id as i64)];
        if outcome.lc_dispatched > 0 {
            self.lc_dispatched.add(u64::from(outcome.lc_dispatched), tags);
        }
        if outcome.be_dispatched > 0 {
            self.be_dispatched.add(u64::from(outcome.be_dispatched), tags);
        }
        if outcome.lc_busy {
            self.lc_busy_ticks.add(1, tags);
        }
        self.record_donation(worker_id, outcome.donated);
        self.record_acquisition(worker_id, outcome.acquired);
    }

    pub fn record_donation(&self, worker_id: usize, amount: u64) {
        if amount > 0 {
            self.cross_worker_donations
                .add(amount, &[KeyValue::new("worker_id", worker_id as i64)]);
        }
    }

    pub fn record_acquisition(&self, worker_id: usize, amount: u64) {
        if amount > 0 {
            self.cross_worker_acquisitions
                .add(amount, &[KeyValue::new("worker_id", worker_id as i64)]);
        }
    }

    pub fn record_admission_rejection(&self) {
        self.admission_rejections.add(1, &[]);
    }

    pub fn record_service_time_us(&self, micros: u64) {
        let mut hist = self.service_time_us.lock().unwrap();
        let _ = hist.record(micros.max(1));
    }

    pub fn service_time_p99_us(&self) -> u64 {
        self.service_time_us.lock().unwrap().value_at_quantile(0.99)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_time_histogram_tracks_p99() {
        let metrics = WorkerMetrics::new();
        for us in 1..=1000u64 {
            metrics.record_service_time_us(us);
        }
        let p99 = metrics.service_time_p99_us();
        more_asserts::assert_ge!(p99, 980);
        more_asserts::assert_le!(p99, 1000);
    }
}
