//! Disk layer for the cache: payload files plus a JSON index manifest

use crate::fingerprint::Fingerprint;
use crate::store::{AudioArtifact, CacheError};
use chrono::{DateTime, Utc};
use polyvox_tts::{AudioData, AudioFormat, EngineId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

const INDEX_FILE: &str = "index.json";
const ARTIFACTS_DIR: &str = "artifacts";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    fingerprint: String,
    text: String,
    engine: EngineId,
    format: AudioFormat,
    sample_rate: u32,
    channels: u16,
    duration_ms: Option<u64>,
    created_at: DateTime<Utc>,
    hits: u64,
    bytes: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    entries: Vec<IndexEntry>,
}

/// Best-effort persistence: the in-memory store is authoritative, disk
/// writes warn on failure and never fail synthesis delivery.
pub(crate) struct PersistLayer {
    root: PathBuf,
}

impl PersistLayer {
    pub(crate) fn new(root: PathBuf) -> Result<Self, CacheError> {
        fs::create_dir_all(root.join(ARTIFACTS_DIR))?;
        Ok(Self { root })
    }

    fn payload_path(&self, fingerprint: &Fingerprint, format: AudioFormat) -> PathBuf {
        self.root
            .join(ARTIFACTS_DIR)
            .join(format!("{}.{}", fingerprint.to_hex(), format.extension()))
    }

    pub(crate) fn store_payload(&self, artifact: &AudioArtifact) {
        let path = self.payload_path(&artifact.fingerprint, artifact.audio.format);
        if let Err(e) = fs::write(&path, &artifact.audio.bytes) {
            warn!("Failed to persist artifact {}: {}", artifact.fingerprint, e);
        }
    }

    pub(crate) fn remove_payload(&self, fingerprint: &Fingerprint, format: AudioFormat) {
        let path = self.payload_path(fingerprint, format);
        if let Err(e) = fs::remove_file(&path) {
            debug!("Failed to remove evicted artifact {}: {}", fingerprint, e);
        }
    }

    pub(crate) fn store_index<'a>(
        &self,
        artifacts: impl Iterator<Item = &'a AudioArtifact>,
    ) {
        let index = Index {
            entries: artifacts
                .map(|a| IndexEntry {
                    fingerprint: a.fingerprint.to_hex(),
                    text: a.text.clone(),
                    engine: a.engine,
                    format: a.audio.format,
                    sample_rate: a.audio.sample_rate,
                    channels: a.audio.channels,
                    duration_ms: a.audio.duration_ms,
                    created_at: a.created_at,
                    hits: a.hits(),
                    bytes: a.audio.bytes.len() as u64,
                })
                .collect(),
        };

        let path = self.root.join(INDEX_FILE);
        match serde_json::to_string_pretty(&index) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    warn!("Failed to write cache index: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize cache index: {}", e),
        }
    }

    /// Load every artifact the index names, skipping entries whose
    /// payload is missing or unreadable.
    pub(crate) fn load(&self) -> Result<Vec<AudioArtifact>, CacheError> {
        let path = self.root.join(INDEX_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&path)?;
        let index: Index = serde_json::from_str(&json)?;

        let mut artifacts = Vec::with_capacity(index.entries.len());
        for entry in index.entries {
            let fingerprint: Fingerprint = match entry.fingerprint.parse() {
                Ok(fp) => fp,
                Err(e) => {
                    warn!("Skipping corrupt index entry: {}", e);
                    continue;
                }
            };

            let payload_path = self.payload_path(&fingerprint, entry.format);
            let bytes = match fs::read(&payload_path) {
                Ok(bytes) if !bytes.is_empty() => bytes,
                Ok(_) => {
                    warn!("Skipping empty artifact payload {}", fingerprint);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping artifact {} with unreadable payload: {}", fingerprint, e);
                    continue;
                }
            };

            let artifact = AudioArtifact::restored(
                fingerprint,
                entry.text,
                entry.engine,
                AudioData {
                    bytes,
                    format: entry.format,
                    sample_rate: entry.sample_rate,
                    channels: entry.channels,
                    duration_ms: entry.duration_ms,
                },
                entry.created_at,
                entry.hits,
            );
            artifacts.push(artifact);
        }

        debug!("Loaded {} cached artifacts from disk", artifacts.len());
        Ok(artifacts)
    }
}
