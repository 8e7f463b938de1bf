//! The cache store: lookup, idempotent insert, hit accounting, LRU eviction

use crate::fingerprint::Fingerprint;
use crate::persist::PersistLayer;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use polyvox_tts::{AudioData, EngineId};
use polyvox_telemetry::CoreMetrics;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache index corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Capacity bounds; eviction keeps the store under both.
#[derive(Debug, Clone, Copy)]
pub struct CacheCapacity {
    pub max_entries: usize,
    pub max_bytes: u64,
}

impl Default for CacheCapacity {
    fn default() -> Self {
        Self {
            max_entries: 512,
            max_bytes: 256 * 1024 * 1024,
        }
    }
}

/// A cached synthesis result. Immutable after creation except for the
/// hit counter.
pub struct AudioArtifact {
    pub fingerprint: Fingerprint,
    /// Normalized text, kept for popularity analytics
    pub text: String,
    pub engine: EngineId,
    pub audio: AudioData,
    pub created_at: DateTime<Utc>,
    hits: AtomicU64,
}

impl AudioArtifact {
    pub fn new(
        fingerprint: Fingerprint,
        text: impl Into<String>,
        engine: EngineId,
        audio: AudioData,
    ) -> Self {
        Self {
            fingerprint,
            text: text.into(),
            engine,
            audio,
            created_at: Utc::now(),
            hits: AtomicU64::new(0),
        }
    }

    pub(crate) fn restored(
        fingerprint: Fingerprint,
        text: String,
        engine: EngineId,
        audio: AudioData,
        created_at: DateTime<Utc>,
        hits: u64,
    ) -> Self {
        Self {
            fingerprint,
            text,
            engine,
            audio,
            created_at,
            hits: AtomicU64::new(hits),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("fingerprint", &self.fingerprint.to_hex())
            .field("text", &self.text)
            .field("engine", &self.engine)
            .field("bytes", &self.audio.bytes.len())
            .field("hits", &self.hits())
            .finish()
    }
}

struct Slot {
    artifact: Arc<AudioArtifact>,
    last_access: AtomicU64,
}

struct Inner {
    map: HashMap<Fingerprint, Slot>,
    total_bytes: u64,
}

/// Read-only size view for status reports
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub capacity: CacheCapacity,
}

/// One row of the popularity ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopularPhrase {
    pub text: String,
    pub engine: EngineId,
    pub hits: u64,
}

/// Content-addressed artifact store.
///
/// Concurrent lookups take the read lock only; insert and eviction
/// share one write-lock section so capacity accounting never races a
/// completing entry.
pub struct CacheStore {
    inner: RwLock<Inner>,
    capacity: CacheCapacity,
    access_clock: AtomicU64,
    persist: Option<PersistLayer>,
    metrics: CoreMetrics,
}

impl CacheStore {
    /// In-memory store without persistence (tests, ephemeral runs)
    pub fn new(capacity: CacheCapacity, metrics: CoreMetrics) -> Self {
        Self {
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                total_bytes: 0,
            }),
            capacity,
            access_clock: AtomicU64::new(0),
            persist: None,
            metrics,
        }
    }

    /// Open a persistent store, restoring any artifacts on disk.
    pub fn open(
        dir: impl Into<PathBuf>,
        capacity: CacheCapacity,
        metrics: CoreMetrics,
    ) -> Result<Self, CacheError> {
        let persist = PersistLayer::new(dir.into())?;
        let restored = persist.load()?;

        let store = Self {
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                total_bytes: 0,
            }),
            capacity,
            access_clock: AtomicU64::new(0),
            persist: Some(persist),
            metrics,
        };

        for artifact in restored {
            store.put(artifact);
        }
        Ok(store)
    }

    fn stamp(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up an artifact. Never blocks on synthesis; O(1) expected.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Arc<AudioArtifact>> {
        let inner = self.inner.read();
        match inner.map.get(fingerprint) {
            Some(slot) => {
                slot.last_access.store(self.stamp(), Ordering::Relaxed);
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&slot.artifact))
            }
            None => {
                self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert an artifact. Idempotent: if the fingerprint is already
    /// present the existing artifact is returned unchanged (first
    /// writer wins), so concurrent duplicate synthesis can never leave
    /// two divergent copies behind.
    pub fn put(&self, artifact: AudioArtifact) -> Arc<AudioArtifact> {
        let fingerprint = artifact.fingerprint;
        let incoming_bytes = artifact.audio.bytes.len() as u64;

        let mut inner = self.inner.write();
        if let Some(existing) = inner.map.get(&fingerprint) {
            return Arc::clone(&existing.artifact);
        }

        self.evict_for(&mut inner, incoming_bytes);

        let artifact = Arc::new(artifact);
        inner.map.insert(
            fingerprint,
            Slot {
                artifact: Arc::clone(&artifact),
                last_access: AtomicU64::new(self.stamp()),
            },
        );
        inner.total_bytes += incoming_bytes;

        self.metrics.cache_insertions.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .cache_entries
            .store(inner.map.len(), Ordering::Relaxed);
        self.metrics
            .cache_bytes
            .store(inner.total_bytes, Ordering::Relaxed);

        if let Some(persist) = &self.persist {
            persist.store_payload(&artifact);
            persist.store_index(inner.map.values().map(|s| s.artifact.as_ref()));
        }

        debug!(
            "Cached artifact {} ({} bytes, {} entries total)",
            fingerprint,
            incoming_bytes,
            inner.map.len()
        );
        artifact
    }

    /// Increment the popularity counter. Side effect only; a missing
    /// entry is ignored rather than surfaced to the caller.
    pub fn record_hit(&self, fingerprint: &Fingerprint) {
        let inner = self.inner.read();
        if let Some(slot) = inner.map.get(fingerprint) {
            slot.artifact.record_hit();
        }
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.read().map.contains_key(fingerprint)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            entries: inner.map.len(),
            total_bytes: inner.total_bytes,
            capacity: self.capacity,
        }
    }

    /// Top-`n` phrases by hit count; the read-only analytics view.
    pub fn popular(&self, n: usize) -> Vec<PopularPhrase> {
        let inner = self.inner.read();
        let mut rows: Vec<PopularPhrase> = inner
            .map
            .values()
            .map(|slot| PopularPhrase {
                text: slot.artifact.text.clone(),
                engine: slot.artifact.engine,
                hits: slot.artifact.hits(),
            })
            .collect();
        rows.sort_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.text.cmp(&b.text)));
        rows.truncate(n);
        rows
    }

    /// Evict least-recently-used artifacts until `incoming_bytes` fits.
    /// An artifact some reader still holds (outstanding `Arc`) is never
    /// evicted; if only such artifacts remain, the store is allowed to
    /// run over capacity rather than invalidate a reader.
    fn evict_for(&self, inner: &mut Inner, incoming_bytes: u64) {
        loop {
            let over_entries = inner.map.len() + 1 > self.capacity.max_entries;
            let over_bytes = inner.total_bytes + incoming_bytes > self.capacity.max_bytes;
            if !over_entries && !over_bytes {
                return;
            }

            let candidate = inner
                .map
                .iter()
                .filter(|(_, slot)| Arc::strong_count(&slot.artifact) == 1)
                .min_by_key(|(_, slot)| slot.last_access.load(Ordering::Relaxed))
                .map(|(fp, _)| *fp);

            let Some(fingerprint) = candidate else {
                warn!("Cache over capacity but every artifact has readers; skipping eviction");
                return;
            };

            if let Some(slot) = inner.map.remove(&fingerprint) {
                inner.total_bytes = inner
                    .total_bytes
                    .saturating_sub(slot.artifact.audio.bytes.len() as u64);
                self.metrics.cache_evictions.fetch_add(1, Ordering::Relaxed);
                if let Some(persist) = &self.persist {
                    persist.remove_payload(&fingerprint, slot.artifact.audio.format);
                }
                debug!("Evicted artifact {}", fingerprint);
            }
        }
    }
}
