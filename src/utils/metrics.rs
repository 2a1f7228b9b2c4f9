use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency window per stage; older samples are dropped in halves.
const MAX_LATENCY_SAMPLES: usize = 1024;

/// Workflow metrics collector.
///
/// Tracks translation runs, cache traffic, stage latencies and failure kinds.
/// Cheap to clone; all clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Run outcomes
    runs_started: AtomicUsize,
    runs_succeeded: AtomicUsize,
    runs_failed: AtomicUsize,
    runs_superseded: AtomicUsize,
    runs_cancelled: AtomicUsize,

    // Persistence
    saves: AtomicUsize,
    save_failures: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_clears: AtomicUsize,

    // Stage latencies
    detection_ms: RwLock<Vec<u64>>,
    translation_ms: RwLock<Vec<u64>>,
    render_ms: RwLock<Vec<u64>>,

    // Batch
    batches_processed: AtomicUsize,
    pages_processed: AtomicUsize,

    failure_kinds: DashMap<&'static str, AtomicUsize>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                runs_started: AtomicUsize::new(0),
                runs_succeeded: AtomicUsize::new(0),
                runs_failed: AtomicUsize::new(0),
                runs_superseded: AtomicUsize::new(0),
                runs_cancelled: AtomicUsize::new(0),
                saves: AtomicUsize::new(0),
                save_failures: AtomicUsize::new(0),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                cache_clears: AtomicUsize::new(0),
                detection_ms: RwLock::new(Vec::new()),
                translation_ms: RwLock::new(Vec::new()),
                render_ms: RwLock::new(Vec::new()),
                batches_processed: AtomicUsize::new(0),
                pages_processed: AtomicUsize::new(0),
                failure_kinds: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    // Run outcomes
    pub fn record_run_started(&self) {
        self.inner.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_succeeded(&self) {
        self.inner.runs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_failed(&self, kind: &'static str) {
        self.inner.runs_failed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .failure_kinds
            .entry(kind)
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_superseded(&self) {
        self.inner.runs_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_cancelled(&self) {
        self.inner.runs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    // Persistence
    pub fn record_save(&self, success: bool) {
        if success {
            self.inner.saves.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.save_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_clear(&self) {
        self.inner.cache_clears.fetch_add(1, Ordering::Relaxed);
    }

    // Stage latencies
    pub fn record_detection(&self, duration: Duration) {
        push_sample(&self.inner.detection_ms, duration);
    }

    pub fn record_translation(&self, duration: Duration) {
        push_sample(&self.inner.translation_ms, duration);
    }

    pub fn record_render(&self, duration: Duration) {
        push_sample(&self.inner.render_ms, duration);
    }

    // Batch
    pub fn record_batch_processed(&self, num_pages: usize) {
        self.inner.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.inner.pages_processed.fetch_add(num_pages, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let cache_hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        let detection = self.inner.detection_ms.read();
        let detection_avg_ms = avg(&detection);
        let detection_p95_ms = percentile(&detection, 0.95);
        drop(detection);

        let translation = self.inner.translation_ms.read();
        let translation_avg_ms = avg(&translation);
        let translation_p95_ms = percentile(&translation, 0.95);
        drop(translation);

        let render_avg_ms = avg(&self.inner.render_ms.read());

        let failure_kinds = self
            .inner
            .failure_kinds
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            runs_started: self.inner.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.inner.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.inner.runs_failed.load(Ordering::Relaxed),
            runs_superseded: self.inner.runs_superseded.load(Ordering::Relaxed),
            runs_cancelled: self.inner.runs_cancelled.load(Ordering::Relaxed),
            saves: self.inner.saves.load(Ordering::Relaxed),
            save_failures: self.inner.save_failures.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            cache_hit_rate,
            cache_clears: self.inner.cache_clears.load(Ordering::Relaxed),
            detection_avg_ms,
            detection_p95_ms,
            translation_avg_ms,
            translation_p95_ms,
            render_avg_ms,
            batches_processed: self.inner.batches_processed.load(Ordering::Relaxed),
            pages_processed: self.inner.pages_processed.load(Ordering::Relaxed),
            failure_kinds,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP translation_runs_total Translation runs by outcome
# TYPE translation_runs_total counter
translation_runs_total {{outcome="started"}} {}
translation_runs_total {{outcome="succeeded"}} {}
translation_runs_total {{outcome="failed"}} {}
translation_runs_total {{outcome="superseded"}} {}
translation_runs_total {{outcome="cancelled"}} {}

# HELP page_cache_saves_total Page cache saves
# TYPE page_cache_saves_total counter
page_cache_saves_total {{}} {}

# HELP cache_hit_rate Page cache hit rate (0.0 to 1.0)
# TYPE cache_hit_rate gauge
cache_hit_rate {{}} {}

# HELP stage_avg_duration_ms Average stage duration in milliseconds
# TYPE stage_avg_duration_ms gauge
stage_avg_duration_ms {{stage="detection"}} {}
stage_avg_duration_ms {{stage="translation"}} {}
stage_avg_duration_ms {{stage="render"}} {}

# HELP pages_processed_total Pages attempted by chapter batches
# TYPE pages_processed_total counter
pages_processed_total {{}} {}
"#,
            snapshot.runs_started,
            snapshot.runs_succeeded,
            snapshot.runs_failed,
            snapshot.runs_superseded,
            snapshot.runs_cancelled,
            snapshot.saves,
            snapshot.cache_hit_rate,
            snapshot.detection_avg_ms,
            snapshot.translation_avg_ms,
            snapshot.render_avg_ms,
            snapshot.pages_processed,
        );

        if !snapshot.failure_kinds.is_empty() {
            out.push_str("\n# HELP run_failures_total Failed runs by error kind\n");
            out.push_str("# TYPE run_failures_total counter\n");
            for (kind, count) in &snapshot.failure_kinds {
                out.push_str(&format!("run_failures_total {{kind=\"{}\"}} {}\n", kind, count));
            }
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub runs_started: usize,
    pub runs_succeeded: usize,
    pub runs_failed: usize,
    pub runs_superseded: usize,
    pub runs_cancelled: usize,
    pub saves: usize,
    pub save_failures: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub cache_clears: usize,
    pub detection_avg_ms: u64,
    pub detection_p95_ms: u64,
    pub translation_avg_ms: u64,
    pub translation_p95_ms: u64,
    pub render_avg_ms: u64,
    pub batches_processed: usize,
    pub pages_processed: usize,
    pub failure_kinds: BTreeMap<String, usize>,
    pub uptime_seconds: u64,
}

fn push_sample(samples: &RwLock<Vec<u64>>, duration: Duration) {
    let mut samples = samples.write();
    if samples.len() >= MAX_LATENCY_SAMPLES {
        samples.drain(..MAX_LATENCY_SAMPLES / 2);
    }
    samples.push(duration.as_millis() as u64);
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_run_started();
        metrics.record_run_started();
        metrics.record_run_succeeded();
        metrics.record_run_failed("detection_unavailable");
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_save(true);
        metrics.record_save(false);
        metrics.record_detection(Duration::from_millis(40));
        metrics.record_detection(Duration::from_millis(60));
        metrics.record_batch_processed(12);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs_started, 2);
        assert_eq!(snapshot.runs_succeeded, 1);
        assert_eq!(snapshot.runs_failed, 1);
        assert_eq!(snapshot.failure_kinds.get("detection_unavailable"), Some(&1));
        assert_eq!(snapshot.cache_hit_rate, 0.5);
        assert_eq!(snapshot.saves, 1);
        assert_eq!(snapshot.save_failures, 1);
        assert_eq!(snapshot.detection_avg_ms, 50);
        assert_eq!(snapshot.pages_processed, 12);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_run_started();
        metrics.record_run_failed("translation_timeout");

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("translation_runs_total {outcome=\"started\"} 1"));
        assert!(prometheus.contains("run_failures_total {kind=\"translation_timeout\"} 1"));
    }

    #[test]
    fn test_latency_samples_are_bounded() {
        let metrics = Metrics::new();
        for _ in 0..3000 {
            metrics.record_detection(Duration::from_millis(10));
        }
        for _ in 0..MAX_LATENCY_SAMPLES {
            metrics.record_detection(Duration::from_millis(30));
        }

        assert!(metrics.inner.detection_ms.read().len() <= MAX_LATENCY_SAMPLES);
        // Only the recent window counts
        assert_eq!(metrics.snapshot().detection_avg_ms, 30);
    }
}
