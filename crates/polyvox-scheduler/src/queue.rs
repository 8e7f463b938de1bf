//! The admission queue: ranking, de-duplication, waiters, cancellation

use parking_lot::Mutex;
use polyvox_cache::{AudioArtifact, Fingerprint};
use polyvox_telemetry::CoreMetrics;
use polyvox_tts::{SynthesisError, SynthesisParams, SynthesisRequest, UserId, VoiceDescriptor};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info};

/// Everything the worker needs to run one synthesis
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub request: SynthesisRequest,
    pub voice: VoiceDescriptor,
    pub params: SynthesisParams,
    pub fingerprint: Fingerprint,
}

type JobResult = Result<Arc<AudioArtifact>, SynthesisError>;

/// Admission rank: administrator tier first, then FIFO by the
/// monotonic sequence assigned at first submission. Never recomputed.
type Rank = (u8, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Pending,
    Admitted,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<JobResult>,
}

struct Entry {
    job: SynthesisJob,
    state: EntryState,
    rank: Rank,
    waiters: Vec<Waiter>,
    enqueued_at: Instant,
    admitted_at: Option<Instant>,
}

struct QueueInner {
    entries: HashMap<Fingerprint, Entry>,
    pending: BTreeMap<Rank, Fingerprint>,
    admitted: Option<Fingerprint>,
    next_seq: u64,
    next_waiter: u64,
}

pub(crate) struct QueueShared {
    pub(crate) inner: Mutex<QueueInner>,
    pub(crate) notify: Notify,
    pub(crate) metrics: CoreMetrics,
}

/// Point-in-time queue view for status reports
#[derive(Debug, Clone)]
pub struct QueueStatus {
    pub pending: usize,
    pub admitted: Option<AdmittedInfo>,
    pub estimated_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct AdmittedInfo {
    pub user: UserId,
    pub running_for: Duration,
}

/// Handle for one waiter attached to a queue entry.
pub struct JobHandle {
    fingerprint: Fingerprint,
    waiter_id: u64,
    position: usize,
    rx: oneshot::Receiver<JobResult>,
    shared: Arc<QueueShared>,
}

impl JobHandle {
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Queue position at submission time: 0 means already admitted,
    /// 1 means next up.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Await the shared result for this entry.
    pub async fn wait(self) -> JobResult {
        self.rx.await.unwrap_or(Err(SynthesisError::Cancelled))
    }

    /// Detach this waiter. A pending entry loses its job when the last
    /// waiter leaves; an admitted entry keeps running (no partial-result
    /// semantics), the caller just stops waiting.
    pub fn cancel(self) {
        let mut inner = self.shared.inner.lock();
        let Some(entry) = inner.entries.get_mut(&self.fingerprint) else {
            return;
        };
        entry.waiters.retain(|w| w.id != self.waiter_id);
        self.shared
            .metrics
            .queue_cancelled
            .fetch_add(1, Ordering::Relaxed);

        if entry.state == EntryState::Pending && entry.waiters.is_empty() {
            let rank = entry.rank;
            inner.entries.remove(&self.fingerprint);
            inner.pending.remove(&rank);
            self.shared
                .metrics
                .queue_depth
                .store(inner.pending.len(), Ordering::Relaxed);
            debug!("Dropped pending entry {} (no waiters left)", self.fingerprint);
        }
    }
}

/// The scheduler's front door. Cloneable; all clones share one queue.
#[derive(Clone)]
pub struct AdmissionQueue {
    pub(crate) shared: Arc<QueueShared>,
}

impl AdmissionQueue {
    pub fn new(metrics: CoreMetrics) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                inner: Mutex::new(QueueInner {
                    entries: HashMap::new(),
                    pending: BTreeMap::new(),
                    admitted: None,
                    next_seq: 0,
                    next_waiter: 0,
                }),
                notify: Notify::new(),
                metrics,
            }),
        }
    }

    /// Submit a job. If an entry with the same fingerprint is already
    /// pending or admitted, the caller is attached as an additional
    /// waiter instead of scheduling duplicate work.
    pub fn submit(&self, job: SynthesisJob) -> JobHandle {
        let mut inner = self.shared.inner.lock();
        self.shared
            .metrics
            .queue_submitted
            .fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        let waiter_id = inner.next_waiter;
        inner.next_waiter += 1;

        let fingerprint = job.fingerprint;
        if let Some(entry) = inner.entries.get_mut(&fingerprint) {
            entry.waiters.push(Waiter { id: waiter_id, tx });
            self.shared
                .metrics
                .queue_deduplicated
                .fetch_add(1, Ordering::Relaxed);
            let position = Self::position_of(&inner, &fingerprint);
            debug!(
                "Attached waiter to in-flight entry {} (position {})",
                fingerprint, position
            );
            return JobHandle {
                fingerprint,
                waiter_id,
                position,
                rx,
                shared: Arc::clone(&self.shared),
            };
        }

        let rank: Rank = (job.request.priority.rank(), inner.next_seq);
        inner.next_seq += 1;
        inner.entries.insert(
            fingerprint,
            Entry {
                job,
                state: EntryState::Pending,
                rank,
                waiters: vec![Waiter { id: waiter_id, tx }],
                enqueued_at: Instant::now(),
                admitted_at: None,
            },
        );
        inner.pending.insert(rank, fingerprint);
        self.shared
            .metrics
            .queue_depth
            .store(inner.pending.len(), Ordering::Relaxed);

        let position = Self::position_of(&inner, &fingerprint);
        debug!("Enqueued entry {} at position {}", fingerprint, position);
        drop(inner);

        self.shared.notify.notify_one();
        JobHandle {
            fingerprint,
            waiter_id,
            position,
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    fn position_of(inner: &QueueInner, fingerprint: &Fingerprint) -> usize {
        if inner.admitted.as_ref() == Some(fingerprint) {
            return 0;
        }
        inner
            .pending
            .values()
            .position(|fp| fp == fingerprint)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn status(&self) -> QueueStatus {
        let inner = self.shared.inner.lock();
        let admitted = inner.admitted.as_ref().and_then(|fp| {
            inner.entries.get(fp).map(|entry| AdmittedInfo {
                user: entry.job.request.user.clone(),
                running_for: entry.admitted_at.unwrap_or(entry.enqueued_at).elapsed(),
            })
        });

        // Per-entry cost seeded from the rolling average; a fresh queue
        // assumes a couple of seconds per utterance.
        let avg_ms = self.shared.metrics.snapshot().avg_synthesis_ms;
        let per_entry = if avg_ms == 0 {
            Duration::from_secs(2)
        } else {
            Duration::from_millis(avg_ms)
        };
        let slots = inner.pending.len() + usize::from(admitted.is_some());

        QueueStatus {
            pending: inner.pending.len(),
            admitted,
            estimated_wait: per_entry * slots as u32,
        }
    }

    /// Fail every pending entry with `Cancelled`; the admitted entry,
    /// if any, is left to finish. Returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.shared.inner.lock();
        let fingerprints: Vec<Fingerprint> = inner.pending.values().copied().collect();
        for fp in &fingerprints {
            if let Some(entry) = inner.entries.remove(fp) {
                inner.pending.remove(&entry.rank);
                for waiter in entry.waiters {
                    let _ = waiter.tx.send(Err(SynthesisError::Cancelled));
                }
            }
        }
        self.shared
            .metrics
            .queue_depth
            .store(inner.pending.len(), Ordering::Relaxed);
        self.shared
            .metrics
            .queue_cancelled
            .fetch_add(fingerprints.len() as u64, Ordering::Relaxed);
        info!("Cleared {} pending queue entries", fingerprints.len());
        fingerprints.len()
    }

    /// Drop every pending entry submitted by `user`, failing its
    /// waiters with `Cancelled`.
    pub fn remove_user(&self, user: &UserId) -> usize {
        let mut inner = self.shared.inner.lock();
        let fingerprints: Vec<Fingerprint> = inner
            .pending
            .values()
            .filter(|fp| {
                inner
                    .entries
                    .get(fp)
                    .is_some_and(|e| &e.job.request.user == user)
            })
            .copied()
            .collect();

        for fp in &fingerprints {
            if let Some(entry) = inner.entries.remove(fp) {
                inner.pending.remove(&entry.rank);
                for waiter in entry.waiters {
                    let _ = waiter.tx.send(Err(SynthesisError::Cancelled));
                }
            }
        }
        self.shared
            .metrics
            .queue_depth
            .store(inner.pending.len(), Ordering::Relaxed);
        self.shared
            .metrics
            .queue_cancelled
            .fetch_add(fingerprints.len() as u64, Ordering::Relaxed);
        if !fingerprints.is_empty() {
            info!("Removed {} queued entries for user {}", fingerprints.len(), user);
        }
        fingerprints.len()
    }

    /// Admit the highest-ranked pending entry. Worker-only; at most one
    /// entry is admitted at any instant.
    pub(crate) fn take_next(&self) -> Option<(Fingerprint, SynthesisJob)> {
        let mut inner = self.shared.inner.lock();
        debug_assert!(inner.admitted.is_none(), "single admitted slot violated");

        let (&rank, &fingerprint) = inner.pending.iter().next()?;
        inner.pending.remove(&rank);
        inner.admitted = Some(fingerprint);
        self.shared
            .metrics
            .queue_depth
            .store(inner.pending.len(), Ordering::Relaxed);

        let entry = inner
            .entries
            .get_mut(&fingerprint)
            .expect("pending entry must exist");
        entry.state = EntryState::Admitted;
        entry.admitted_at = Some(Instant::now());
        Some((fingerprint, entry.job.clone()))
    }

    /// Resolve the admitted entry with a cached artifact. The caller
    /// must have inserted into the cache already, so late lookups by
    /// other tasks can only see the stored copy.
    pub(crate) fn complete(&self, fingerprint: Fingerprint, artifact: Arc<AudioArtifact>) {
        let mut inner = self.shared.inner.lock();
        inner.admitted = None;
        if let Some(entry) = inner.entries.remove(&fingerprint) {
            for waiter in entry.waiters {
                let _ = waiter.tx.send(Ok(Arc::clone(&artifact)));
            }
            self.shared
                .metrics
                .queue_completed
                .fetch_add(1, Ordering::Relaxed);
        }
        self.shared.notify.notify_one();
    }

    /// Fail the admitted entry: every waiter receives the specific
    /// error, the entry is removed, and nothing is retried.
    pub(crate) fn fail(&self, fingerprint: Fingerprint, error: SynthesisError) {
        let mut inner = self.shared.inner.lock();
        inner.admitted = None;
        if let Some(entry) = inner.entries.remove(&fingerprint) {
            for waiter in entry.waiters {
                let _ = waiter.tx.send(Err(error.clone()));
            }
            self.shared
                .metrics
                .queue_failed
                .fetch_add(1, Ordering::Relaxed);
        }
        self.shared.notify.notify_one();
    }
}
