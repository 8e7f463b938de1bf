//! Read-only status aggregation for analytics consumers

use polyvox_cache::{CacheStats, CacheStore, PopularPhrase};
use polyvox_scheduler::{AdmissionQueue, QueueStatus};
use polyvox_telemetry::{CoreMetrics, MetricsSnapshot};
use std::fmt;

/// One status report: queue, cache, and counters, snapshotted together.
/// Collecting a report never mutates core state.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub queue: QueueStatus,
    pub cache: CacheStats,
    pub metrics: MetricsSnapshot,
    pub popular: Vec<PopularPhrase>,
}

impl StatusReport {
    pub fn collect(
        queue: &AdmissionQueue,
        cache: &CacheStore,
        metrics: &CoreMetrics,
        top_phrases: usize,
    ) -> Self {
        Self {
            queue: queue.status(),
            cache: cache.stats(),
            metrics: metrics.snapshot(),
            popular: cache.popular(top_phrases),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queue: {} pending{} (est. wait {:?}) | cache: {} entries, {} KiB, {} hits / {} misses | \
             synth: {} ok, {} failed, avg {} ms",
            self.queue.pending,
            match &self.queue.admitted {
                Some(info) => format!(", synthesizing for {}", info.user),
                None => String::new(),
            },
            self.queue.estimated_wait,
            self.cache.entries,
            self.cache.total_bytes / 1024,
            self.metrics.cache_hits,
            self.metrics.cache_misses,
            self.metrics.synth_success,
            self.metrics.synth_failures,
            self.metrics.avg_synthesis_ms,
        )?;

        if !self.popular.is_empty() {
            write!(f, " | top: ")?;
            for (i, row) in self.popular.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                let preview: String = row.text.chars().take(24).collect();
                write!(f, "\"{}\" x{}", preview, row.hits)?;
            }
        }
        Ok(())
    }
}
