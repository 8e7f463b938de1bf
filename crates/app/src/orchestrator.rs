//! Request orchestration: cache first, then the admission queue
//!
//! The only component that talks to both the cache store and the
//! queue, which keeps cache-population logic out of the scheduler.

use polyvox_cache::{normalize_text, AudioArtifact, CacheStore, Fingerprint};
use polyvox_scheduler::{AdmissionQueue, SynthesisJob};
use polyvox_tts::{SynthesisError, SynthesisParams, SynthesisRequest, UserId, VoiceDescriptor};
use polyvox_voices::{ProfileError, VersionEntry, VersionId, VoiceRegistry, VoiceSample};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("Invalid text: {0}")]
    InvalidText(String),
}

pub struct Orchestrator {
    cache: Arc<CacheStore>,
    voices: Arc<VoiceRegistry>,
    queue: AdmissionQueue,
    default_voice: Option<VoiceDescriptor>,
    default_params: SynthesisParams,
    max_text_length: usize,
    max_repeat_chars: usize,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<CacheStore>,
        voices: Arc<VoiceRegistry>,
        queue: AdmissionQueue,
        default_voice: Option<VoiceDescriptor>,
        default_params: SynthesisParams,
        max_text_length: usize,
        max_repeat_chars: usize,
    ) -> Self {
        Self {
            cache,
            voices,
            queue,
            default_voice,
            default_params,
            max_text_length,
            max_repeat_chars,
        }
    }

    /// Handle one utterance request: cache hit returns immediately,
    /// a miss is scheduled and awaited. Identical concurrent requests
    /// share one synthesis via the queue's fingerprint de-duplication.
    pub async fn handle(
        &self,
        mut request: SynthesisRequest,
    ) -> Result<Arc<AudioArtifact>, CoreError> {
        request.text = self.clean_text(&request.text)?;
        let voice = self.resolve_voice(&request).await?;

        let fingerprint = Fingerprint::compute(
            &normalize_text(&request.text),
            &voice,
            request.engine,
            &self.default_params,
        );

        if let Some(artifact) = self.cache.lookup(&fingerprint) {
            self.cache.record_hit(&fingerprint);
            debug!("Cache hit for {} ({})", fingerprint, request.user);
            return Ok(artifact);
        }

        let handle = self.queue.submit(SynthesisJob {
            request,
            voice,
            params: self.default_params.clone(),
            fingerprint,
        });
        debug!(
            "Cache miss for {}; queued at position {}",
            fingerprint,
            handle.position()
        );

        Ok(handle.wait().await?)
    }

    /// Text hygiene before fingerprinting: trim, collapse long
    /// character runs, cap the length.
    fn clean_text(&self, raw: &str) -> Result<String, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidText("empty request".to_string()));
        }

        let mut cleaned = String::with_capacity(trimmed.len());
        let mut run_char = None;
        let mut run_len = 0usize;
        for c in trimmed.chars() {
            if Some(c) == run_char {
                run_len += 1;
            } else {
                run_char = Some(c);
                run_len = 1;
            }
            if run_len <= self.max_repeat_chars {
                cleaned.push(c);
            }
        }

        if cleaned.chars().count() > self.max_text_length {
            cleaned = cleaned.chars().take(self.max_text_length).collect();
        }
        Ok(cleaned)
    }

    /// Effective voice: explicit override, then the requester's active
    /// profile, then the configured default.
    async fn resolve_voice(
        &self,
        request: &SynthesisRequest,
    ) -> Result<VoiceDescriptor, CoreError> {
        if let Some(voice) = &request.voice_override {
            return Ok(voice.clone());
        }
        if let Some(voice) = self.voices.get_active(&request.user).await {
            return Ok(voice);
        }
        self.default_voice.clone().ok_or_else(|| {
            SynthesisError::InvalidVoice(
                "no voice uploaded and no default voice configured".to_string(),
            )
            .into()
        })
    }

    // Profile operations pass through to the registry unchanged; they
    // are exposed here so command handlers have a single facade.

    pub async fn upload_voice(
        &self,
        user: &UserId,
        sample: &VoiceSample,
        label: Option<String>,
    ) -> Result<VoiceDescriptor, CoreError> {
        Ok(self.voices.upload(user, sample, label).await?)
    }

    pub async fn replace_voice(
        &self,
        user: &UserId,
        sample: &VoiceSample,
        label: Option<String>,
    ) -> Result<VoiceDescriptor, CoreError> {
        Ok(self.voices.replace(user, sample, label).await?)
    }

    pub async fn restore_voice(
        &self,
        user: &UserId,
        version: VersionId,
    ) -> Result<VoiceDescriptor, CoreError> {
        Ok(self.voices.restore(user, version).await?)
    }

    pub async fn voice_history(&self, user: &UserId) -> Vec<VersionEntry> {
        self.voices.history(user).await
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }
}
