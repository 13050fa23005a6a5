//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the worker throughput and queue-depth counters/gauges called out
//!   as the ambient metrics surface for the finalization pipeline.

use std::convert::TryFrom;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across the daemon and CLI.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    jobs_claimed_total: IntCounterVec,
    jobs_finalized_total: IntCounterVec,
    jobs_failed_total: IntCounterVec,
    jobs_retried_total: IntCounterVec,
    queue_depth: IntGauge,
    in_flight: IntGauge,
    worker_degraded: IntGauge,
    claim_latency_ms: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Current depth of the due-job queue at the last poll.
    pub queue_depth: i64,
    /// Jobs currently claimed and being processed by this worker instance.
    pub in_flight: i64,
    /// Whether this worker instance currently reports a degraded component.
    pub worker_degraded: bool,
    /// Latest observed latency (ms) of a single `list_due`/claim poll.
    pub claim_latency_ms: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let jobs_claimed_total = IntCounterVec::new(
            Opts::new("upload_jobs_claimed_total", "Finalize jobs claimed by this worker"),
            &["upload_id"],
        )?;
        let jobs_finalized_total = IntCounterVec::new(
            Opts::new(
                "upload_jobs_finalized_total",
                "Finalize jobs that reached the finalized state",
            ),
            &["upload_id"],
        )?;
        let jobs_failed_total = IntCounterVec::new(
            Opts::new(
                "upload_jobs_failed_total",
                "Finalize jobs that were permanently failed, by reason",
            ),
            &["reason"],
        )?;
        let jobs_retried_total = IntCounterVec::new(
            Opts::new(
                "upload_jobs_retried_total",
                "Finalize jobs rescheduled for a later attempt, by reason",
            ),
            &["reason"],
        )?;
        let queue_depth = IntGauge::with_opts(Opts::new(
            "upload_queue_depth",
            "Due finalize jobs observed on the last poll",
        ))?;
        let in_flight = IntGauge::with_opts(Opts::new(
            "upload_jobs_in_flight",
            "Finalize jobs currently claimed by this worker instance",
        ))?;
        let worker_degraded = IntGauge::with_opts(Opts::new(
            "upload_worker_degraded",
            "1 if this worker instance currently reports a degraded component",
        ))?;
        let claim_latency_ms = IntGauge::with_opts(Opts::new(
            "upload_claim_latency_ms",
            "Latency of the most recent list_due/claim poll, in milliseconds",
        ))?;

        registry.register(Box::new(jobs_claimed_total.clone()))?;
        registry.register(Box::new(jobs_finalized_total.clone()))?;
        registry.register(Box::new(jobs_failed_total.clone()))?;
        registry.register(Box::new(jobs_retried_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(worker_degraded.clone()))?;
        registry.register(Box::new(claim_latency_ms.clone()))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                jobs_claimed_total,
                jobs_finalized_total,
                jobs_failed_total,
                jobs_retried_total,
                queue_depth,
                in_flight,
                worker_degraded,
                claim_latency_ms,
            }),
        })
    }

    /// Record a successful claim of a due finalize job.
    pub fn inc_job_claimed(&self, upload_id: &str) {
        self.inner
            .jobs_claimed_total
            .with_label_values(&[upload_id])
            .inc();
    }

    /// Record a job reaching the finalized state.
    pub fn inc_job_finalized(&self, upload_id: &str) {
        self.inner
            .jobs_finalized_total
            .with_label_values(&[upload_id])
            .inc();
    }

    /// Record a job being permanently failed, tagged with its failure reason.
    pub fn inc_job_failed(&self, reason: &str) {
        self.inner.jobs_failed_total.with_label_values(&[reason]).inc();
    }

    /// Record a job being rescheduled for a later attempt.
    pub fn inc_job_retried(&self, reason: &str) {
        self.inner.jobs_retried_total.with_label_values(&[reason]).inc();
    }

    /// Set the due-job queue depth observed on the last poll.
    pub fn set_queue_depth(&self, depth: i64) {
        self.inner.queue_depth.set(depth);
    }

    /// Set the number of jobs currently claimed by this worker instance.
    pub fn set_in_flight(&self, count: i64) {
        self.inner.in_flight.set(count);
    }

    /// Record whether this worker instance currently reports a degraded component.
    pub fn set_worker_degraded(&self, degraded: bool) {
        self.inner.worker_degraded.set(i64::from(degraded));
    }

    /// Record the observed latency of a `list_due`/claim poll.
    pub fn observe_claim_latency(&self, duration: Duration) {
        self.inner.claim_latency_ms.set(Self::duration_to_ms(duration));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the most relevant gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_depth: self.inner.queue_depth.get(),
            in_flight: self.inner.in_flight.get(),
            worker_degraded: self.inner.worker_degraded.get() != 0,
            claim_latency_ms: self.inner.claim_latency_ms.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn duration_to_ms_saturates_on_large_values() {
        let duration = Duration::from_secs(u64::MAX / 2);
        assert_eq!(Metrics::duration_to_ms(duration), i64::MAX);
    }

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_job_claimed("upload-1");
        metrics.inc_job_finalized("upload-1");
        metrics.inc_job_failed("missing_original_variant");
        metrics.inc_job_retried("staging_object_missing");
        metrics.set_queue_depth(3);
        metrics.set_in_flight(1);
        metrics.set_worker_degraded(true);
        metrics.observe_claim_latency(Duration::from_millis(12));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queue_depth, 3);
        assert_eq!(snapshot.in_flight, 1);
        assert!(snapshot.worker_degraded);
        assert_eq!(snapshot.claim_latency_ms, 12);

        let rendered = metrics.render()?;
        assert!(rendered.contains("upload_jobs_claimed_total"));
        assert!(rendered.contains("upload_jobs_failed_total"));
        assert!(rendered.contains("upload_worker_degraded"));
        Ok(())
    }
}
