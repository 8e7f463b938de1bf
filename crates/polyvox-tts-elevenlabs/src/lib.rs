//! ElevenLabs cloud engine adapter for polyvox
//!
//! Wraps the ElevenLabs HTTP API behind the shared backend trait and
//! maps its status codes onto the synthesis error taxonomy. Also
//! exposes the voice-clone upload used by the profile registry's
//! cloud path.

use polyvox_tts::{
    AudioData, AudioFormat, EngineId, SynthesisBackend, SynthesisError, SynthesisParams,
    SynthesisResult, VoiceDescriptor, VoiceRef,
};

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

mod tests;

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

/// Configuration for the ElevenLabs adapter
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    /// API key; empty means the engine is unavailable
    pub api_key: String,
    pub base_url: String,
    /// Model id sent with each synthesis call
    pub model_id: String,
    /// Client-side deadline for one call
    pub timeout: Duration,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: "eleven_turbo_v2_5".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// A voice known to the remote account
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVoice {
    pub voice_id: String,
    pub name: String,
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<RemoteVoice>,
}

#[derive(Deserialize)]
struct AddVoiceResponse {
    voice_id: String,
}

pub struct ElevenLabsEngine {
    config: ElevenLabsConfig,
    client: reqwest::Client,
}

impl ElevenLabsEngine {
    pub fn new(config: ElevenLabsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn voice_id<'a>(&self, voice: &'a VoiceDescriptor) -> SynthesisResult<&'a str> {
        match &voice.reference {
            VoiceRef::RemoteVoice(id) => Ok(id),
            VoiceRef::SampleFile(path) => Err(SynthesisError::InvalidVoice(format!(
                "sample {} is not a cloud voice; clone it first",
                path.display()
            ))),
        }
    }

    /// Map an HTTP status onto the shared error taxonomy.
    fn map_status(status: u16, retry_after: Option<Duration>, body: &str) -> SynthesisError {
        match status {
            429 => SynthesisError::RateLimited { retry_after },
            400 | 404 if body.to_lowercase().contains("voice") => {
                SynthesisError::InvalidVoice(body.trim().to_string())
            }
            400 | 422 => SynthesisError::InvalidInput(body.trim().to_string()),
            _ => SynthesisError::BackendUnavailable(format!("HTTP {}: {}", status, body.trim())),
        }
    }

    fn map_transport(err: reqwest::Error, timeout: Duration) -> SynthesisError {
        if err.is_timeout() {
            SynthesisError::Timeout { elapsed: timeout }
        } else {
            SynthesisError::BackendUnavailable(err.to_string())
        }
    }

    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get(reqwest::header::RETRY_AFTER)?
            .to_str()
            .ok()?
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    /// Voices available to the configured account
    pub async fn list_voices(&self) -> SynthesisResult<Vec<RemoteVoice>> {
        let url = format!("{}/v1/voices", self.config.base_url);
        let resp = self
            .client
            .get(&url)
            .header("xi-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| Self::map_transport(e, self.config.timeout))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_status(status, None, &body));
        }

        let parsed: VoicesResponse = resp
            .json()
            .await
            .map_err(|e| SynthesisError::BackendUnavailable(e.to_string()))?;
        Ok(parsed.voices)
    }

    /// Upload a speaker sample as a new cloned voice; returns the
    /// remote voice id. This is an account mutation, not a synthesis
    /// call, so it does not go through the admission gate.
    pub async fn clone_voice(
        &self,
        name: &str,
        sample_path: &Path,
    ) -> SynthesisResult<String> {
        let bytes = tokio::fs::read(sample_path).await.map_err(|e| {
            SynthesisError::InvalidVoice(format!("{}: {}", sample_path.display(), e))
        })?;

        let file_name = sample_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample.wav".to_string());

        let form = reqwest::multipart::Form::new()
            .text("name", name.to_string())
            .part(
                "files",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("audio/wav")
                    .map_err(|e| SynthesisError::InvalidVoice(e.to_string()))?,
            );

        let url = format!("{}/v1/voices/add", self.config.base_url);
        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::map_transport(e, self.config.timeout))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = Self::parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_status(status, retry_after, &body));
        }

        let parsed: AddVoiceResponse = resp
            .json()
            .await
            .map_err(|e| SynthesisError::BackendUnavailable(e.to_string()))?;

        debug!("Cloned voice '{}' -> {}", name, parsed.voice_id);
        Ok(parsed.voice_id)
    }
}

#[async_trait]
impl SynthesisBackend for ElevenLabsEngine {
    fn id(&self) -> EngineId {
        EngineId::ElevenLabs
    }

    fn name(&self) -> &str {
        "ElevenLabs"
    }

    async fn is_available(&self) -> bool {
        if self.config.api_key.is_empty() {
            return false;
        }
        match self.list_voices().await {
            Ok(_) => true,
            Err(e) => {
                warn!("ElevenLabs availability probe failed: {}", e);
                false
            }
        }
    }

    async fn synthesize(
        &mut self,
        text: &str,
        voice: &VoiceDescriptor,
        params: &SynthesisParams,
    ) -> SynthesisResult<AudioData> {
        if text.trim().is_empty() {
            return Err(SynthesisError::InvalidInput("empty text".to_string()));
        }
        if self.config.api_key.is_empty() {
            return Err(SynthesisError::BackendUnavailable(
                "no API key configured".to_string(),
            ));
        }

        let cloud = self.translate_voice(voice)?;
        let voice_id = self.voice_id(&cloud)?;

        let mut voice_settings = serde_json::Map::new();
        if let Some(stability) = params.stability {
            voice_settings.insert("stability".to_string(), stability.into());
        }
        if let Some(similarity) = params.similarity_boost {
            voice_settings.insert("similarity_boost".to_string(), similarity.into());
        }

        let body = serde_json::json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": voice_settings,
        });

        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url, voice_id
        );
        debug!("ElevenLabs synthesis: voice={} {} chars", voice_id, text.len());

        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_transport(e, self.config.timeout))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = Self::parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            warn!("ElevenLabs synthesis failed: HTTP {} {}", status, body);
            return Err(Self::map_status(status, retry_after, &body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Self::map_transport(e, self.config.timeout))?
            .to_vec();

        if bytes.is_empty() {
            return Err(SynthesisError::BackendUnavailable(
                "empty audio response".to_string(),
            ));
        }

        Ok(AudioData {
            bytes,
            format: AudioFormat::Mp3,
            sample_rate: 44_100,
            channels: 1,
            duration_ms: None,
        })
    }

    fn translate_voice(&self, voice: &VoiceDescriptor) -> SynthesisResult<VoiceDescriptor> {
        match (&voice.engine, &voice.reference) {
            (EngineId::ElevenLabs, VoiceRef::RemoteVoice(_)) => Ok(voice.clone()),
            // A faithful translation would require a clone upload, which
            // is an explicit registry operation; refuse rather than
            // degrade silently.
            _ => Err(SynthesisError::InvalidVoice(format!(
                "voice {} is not usable with the cloud engine",
                voice.cache_key()
            ))),
        }
    }
}
