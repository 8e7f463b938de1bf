//! The registry: per-user serialized mutation over persistent profiles

use crate::error::ProfileError;
use crate::profile::{VersionEntry, VersionId, VoiceProfile};
use crate::sample::{SampleFormat, VoiceSample};
use parking_lot::RwLock;
use polyvox_telemetry::CoreMetrics;
use polyvox_tts::{UserId, VoiceDescriptor};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PROFILES_DIR: &str = "profiles";
const SAMPLES_DIR: &str = "samples";

/// Voice profile registry.
///
/// The outer map is read-mostly; each profile sits behind its own async
/// mutex, so upload/replace/restore for one user can never interleave
/// while different users mutate in parallel.
pub struct VoiceRegistry {
    profiles: RwLock<HashMap<UserId, Arc<Mutex<VoiceProfile>>>>,
    profiles_dir: PathBuf,
    samples_dir: PathBuf,
    backup_limit: usize,
    metrics: CoreMetrics,
}

impl VoiceRegistry {
    /// Open the registry rooted at `dir`, restoring persisted profiles.
    pub fn open(
        dir: impl Into<PathBuf>,
        backup_limit: usize,
        metrics: CoreMetrics,
    ) -> Result<Self, ProfileError> {
        let root = dir.into();
        let profiles_dir = root.join(PROFILES_DIR);
        let samples_dir = root.join(SAMPLES_DIR);
        fs::create_dir_all(&profiles_dir)?;
        fs::create_dir_all(&samples_dir)?;

        let mut profiles = HashMap::new();
        for entry in fs::read_dir(&profiles_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(ProfileError::from)
                .and_then(|json| serde_json::from_str::<VoiceProfile>(&json).map_err(Into::into))
            {
                Ok(profile) => {
                    profiles.insert(profile.user.clone(), Arc::new(Mutex::new(profile)));
                }
                Err(e) => warn!("Skipping corrupt profile {}: {}", path.display(), e),
            }
        }
        debug!("Loaded {} voice profiles", profiles.len());

        Ok(Self {
            profiles: RwLock::new(profiles),
            profiles_dir,
            samples_dir,
            backup_limit,
            metrics,
        })
    }

    fn cell(&self, user: &UserId) -> Arc<Mutex<VoiceProfile>> {
        if let Some(cell) = self.profiles.read().get(user) {
            return Arc::clone(cell);
        }
        let mut map = self.profiles.write();
        Arc::clone(
            map.entry(user.clone())
                .or_insert_with(|| Arc::new(Mutex::new(VoiceProfile::new(user.clone())))),
        )
    }

    fn sanitize(user: &UserId) -> String {
        user.as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn profile_path(&self, user: &UserId) -> PathBuf {
        self.profiles_dir
            .join(format!("{}.json", Self::sanitize(user)))
    }

    fn save(&self, profile: &VoiceProfile) -> Result<(), ProfileError> {
        let json = serde_json::to_string_pretty(profile)?;
        fs::write(self.profile_path(&profile.user), json)?;
        Ok(())
    }

    /// Copy an uploaded sample into registry-owned storage.
    fn store_sample(
        &self,
        user: &UserId,
        sample: &VoiceSample,
        version: VersionId,
        format: SampleFormat,
    ) -> Result<PathBuf, ProfileError> {
        let dest = self.samples_dir.join(format!(
            "{}_{}.{}",
            Self::sanitize(user),
            version.0,
            format.extension()
        ));
        fs::copy(sample.path(), &dest)?;
        Ok(dest)
    }

    fn cleanup_pruned(&self, profile: &VoiceProfile, removed: &[VersionEntry]) {
        for entry in removed {
            let Some(path) = &entry.source_sample else {
                continue;
            };
            if !path.starts_with(&self.samples_dir) {
                continue;
            }
            let still_referenced = profile
                .history()
                .iter()
                .any(|v| v.source_sample.as_deref() == Some(path.as_path()));
            if still_referenced {
                continue;
            }
            if let Err(e) = fs::remove_file(path) {
                debug!("Failed to remove pruned sample {}: {}", path.display(), e);
            }
        }
    }

    /// Active voice for a user; absent means the caller falls back to a
    /// default voice.
    pub async fn get_active(&self, user: &UserId) -> Option<VoiceDescriptor> {
        let cell = self.cell(user);
        let profile = cell.lock().await;
        profile.current_entry().map(|e| e.descriptor.clone())
    }

    /// Create a new voice version from an uploaded sample and make it
    /// current.
    pub async fn upload(
        &self,
        user: &UserId,
        sample: &VoiceSample,
        label: Option<String>,
    ) -> Result<VoiceDescriptor, ProfileError> {
        let (descriptor, id) = self.add_version(user, sample, label).await?;
        info!("User {} uploaded voice {}", user, id);
        Ok(descriptor)
    }

    /// Supersede the current voice. Identical to `upload` except in
    /// framing: the prior current entry is explicitly retained as a
    /// backup and stays restorable.
    pub async fn replace(
        &self,
        user: &UserId,
        sample: &VoiceSample,
        label: Option<String>,
    ) -> Result<VoiceDescriptor, ProfileError> {
        let previous = {
            let cell = self.cell(user);
            let profile = cell.lock().await;
            profile.current_id()
        };
        let (descriptor, id) = self.add_version(user, sample, label).await?;
        match previous {
            Some(prev) => info!(
                "User {} replaced voice {} with {}; backup retained",
                user, prev, id
            ),
            None => info!("User {} replaced absent voice with {}", user, id),
        }
        Ok(descriptor)
    }

    async fn add_version(
        &self,
        user: &UserId,
        sample: &VoiceSample,
        label: Option<String>,
    ) -> Result<(VoiceDescriptor, VersionId), ProfileError> {
        let format = sample.validate()?;

        let cell = self.cell(user);
        let mut profile = cell.lock().await;

        let version = profile.peek_next_version();
        let stored = self.store_sample(user, sample, version, format)?;
        let descriptor = VoiceDescriptor::sample_file(stored.clone());

        let id = profile.append(descriptor.clone(), Some(stored), label);
        let removed = profile.prune_backups(self.backup_limit);
        self.cleanup_pruned(&profile, &removed);
        self.save(&profile)?;

        self.metrics.profile_uploads.fetch_add(1, Ordering::Relaxed);
        Ok((descriptor, id))
    }

    /// Register a cloud-cloned voice as a new version. The sample that
    /// seeded the clone, when provided, is kept so the local engine can
    /// still condition on it.
    pub async fn register_remote(
        &self,
        user: &UserId,
        voice_id: &str,
        seed_sample: Option<&VoiceSample>,
        label: Option<String>,
    ) -> Result<VoiceDescriptor, ProfileError> {
        let cell = self.cell(user);
        let mut profile = cell.lock().await;

        let version = profile.peek_next_version();
        let stored = match seed_sample {
            Some(sample) => {
                let format = sample.validate()?;
                Some(self.store_sample(user, sample, version, format)?)
            }
            None => None,
        };

        let mut descriptor = VoiceDescriptor::remote_voice(voice_id);
        if let Some(path) = &stored {
            descriptor = descriptor.with_source_sample(path.clone());
        }

        let id = profile.append(descriptor.clone(), stored, label);
        let removed = profile.prune_backups(self.backup_limit);
        self.cleanup_pruned(&profile, &removed);
        self.save(&profile)?;

        self.metrics.profile_uploads.fetch_add(1, Ordering::Relaxed);
        info!("User {} registered cloud voice {} as {}", user, voice_id, id);
        Ok(descriptor)
    }

    /// Point the user's current voice at an existing version. Never
    /// creates or deletes entries.
    pub async fn restore(
        &self,
        user: &UserId,
        version: VersionId,
    ) -> Result<VoiceDescriptor, ProfileError> {
        let cell = self.cell(user);
        let mut profile = cell.lock().await;

        let descriptor = profile.restore(version)?.descriptor.clone();
        self.save(&profile)?;

        self.metrics.profile_restores.fetch_add(1, Ordering::Relaxed);
        info!("User {} restored voice {}", user, version);
        Ok(descriptor)
    }

    /// Version history, newest first.
    pub async fn history(&self, user: &UserId) -> Vec<VersionEntry> {
        let cell = self.cell(user);
        let profile = cell.lock().await;
        profile.history()
    }

    pub fn samples_dir(&self) -> &Path {
        &self.samples_dir
    }
}
