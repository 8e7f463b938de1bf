use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared metrics for cross-task monitoring of the synthesis core.
///
/// Writers touch individual atomics; analytics consumers take a
/// [`MetricsSnapshot`] and never contend with the hot path.
#[derive(Clone)]
pub struct CoreMetrics {
    // Cache
    pub cache_hits: Arc<AtomicU64>,
    pub cache_misses: Arc<AtomicU64>,
    pub cache_insertions: Arc<AtomicU64>,
    pub cache_evictions: Arc<AtomicU64>,
    pub cache_entries: Arc<AtomicUsize>, // gauge
    pub cache_bytes: Arc<AtomicU64>,     // gauge

    // Queue
    pub queue_depth: Arc<AtomicUsize>, // gauge
    pub queue_submitted: Arc<AtomicU64>,
    pub queue_deduplicated: Arc<AtomicU64>,
    pub queue_completed: Arc<AtomicU64>,
    pub queue_failed: Arc<AtomicU64>,
    pub queue_cancelled: Arc<AtomicU64>,

    // Synthesis
    pub synth_success: Arc<AtomicU64>,
    pub synth_failures: Arc<AtomicU64>,
    pub last_synthesis_ms: Arc<AtomicU64>,
    pub total_synthesis_ms: Arc<AtomicU64>,

    // Profiles
    pub profile_uploads: Arc<AtomicU64>,
    pub profile_restores: Arc<AtomicU64>,

    pub last_activity: Arc<RwLock<Option<Instant>>>,
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self {
            cache_hits: Arc::new(AtomicU64::new(0)),
            cache_misses: Arc::new(AtomicU64::new(0)),
            cache_insertions: Arc::new(AtomicU64::new(0)),
            cache_evictions: Arc::new(AtomicU64::new(0)),
            cache_entries: Arc::new(AtomicUsize::new(0)),
            cache_bytes: Arc::new(AtomicU64::new(0)),

            queue_depth: Arc::new(AtomicUsize::new(0)),
            queue_submitted: Arc::new(AtomicU64::new(0)),
            queue_deduplicated: Arc::new(AtomicU64::new(0)),
            queue_completed: Arc::new(AtomicU64::new(0)),
            queue_failed: Arc::new(AtomicU64::new(0)),
            queue_cancelled: Arc::new(AtomicU64::new(0)),

            synth_success: Arc::new(AtomicU64::new(0)),
            synth_failures: Arc::new(AtomicU64::new(0)),
            last_synthesis_ms: Arc::new(AtomicU64::new(0)),
            total_synthesis_ms: Arc::new(AtomicU64::new(0)),

            profile_uploads: Arc::new(AtomicU64::new(0)),
            profile_restores: Arc::new(AtomicU64::new(0)),

            last_activity: Arc::new(RwLock::new(None)),
        }
    }
}

impl CoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished synthesis call and its wall-clock duration.
    pub fn observe_synthesis(&self, duration: Duration, success: bool) {
        let ms = duration.as_millis() as u64;
        self.last_synthesis_ms.store(ms, Ordering::Relaxed);
        self.total_synthesis_ms.fetch_add(ms, Ordering::Relaxed);
        if success {
            self.synth_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.synth_failures.fetch_add(1, Ordering::Relaxed);
        }
        *self.last_activity.write() = Some(Instant::now());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let success = self.synth_success.load(Ordering::Relaxed);
        let failures = self.synth_failures.load(Ordering::Relaxed);
        let total_ms = self.total_synthesis_ms.load(Ordering::Relaxed);
        let finished = success + failures;

        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_insertions: self.cache_insertions.load(Ordering::Relaxed),
            cache_evictions: self.cache_evictions.load(Ordering::Relaxed),
            cache_entries: self.cache_entries.load(Ordering::Relaxed),
            cache_bytes: self.cache_bytes.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            queue_submitted: self.queue_submitted.load(Ordering::Relaxed),
            queue_deduplicated: self.queue_deduplicated.load(Ordering::Relaxed),
            queue_completed: self.queue_completed.load(Ordering::Relaxed),
            queue_failed: self.queue_failed.load(Ordering::Relaxed),
            queue_cancelled: self.queue_cancelled.load(Ordering::Relaxed),
            synth_success: success,
            synth_failures: failures,
            last_synthesis_ms: self.last_synthesis_ms.load(Ordering::Relaxed),
            avg_synthesis_ms: if finished > 0 { total_ms / finished } else { 0 },
            profile_uploads: self.profile_uploads.load(Ordering::Relaxed),
            profile_restores: self.profile_restores.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time, read-only view of [`CoreMetrics`] for analytics consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_insertions: u64,
    pub cache_evictions: u64,
    pub cache_entries: usize,
    pub cache_bytes: u64,
    pub queue_depth: usize,
    pub queue_submitted: u64,
    pub queue_deduplicated: u64,
    pub queue_completed: u64,
    pub queue_failed: u64,
    pub queue_cancelled: u64,
    pub synth_success: u64,
    pub synth_failures: u64,
    pub last_synthesis_ms: u64,
    pub avg_synthesis_ms: u64,
    pub profile_uploads: u64,
    pub profile_restores: u64,
}
