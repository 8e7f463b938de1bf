//! Local XTTS model engine adapter for polyvox
//!
//! Drives an `xtts` command-line front end to the local model: text and
//! a speaker sample in, WAV on stdout. The process is the shared GPU
//! resource; the admission worker holds this adapter exclusively.

use polyvox_tts::{
    AudioData, AudioFormat, EngineId, SynthesisBackend, SynthesisError, SynthesisParams,
    SynthesisResult, VoiceDescriptor, VoiceRef,
};

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, warn};


/// Configuration for the local XTTS adapter
#[derive(Debug, Clone)]
pub struct XttsConfig {
    /// Command to invoke (e.g. "xtts" on PATH, or an absolute path)
    pub command: String,
    /// Model directory passed through to the CLI, when set
    pub model_dir: Option<PathBuf>,
    /// Hard deadline for one synthesis call
    pub timeout: Duration,
    /// Output sample rate the model is configured for
    pub sample_rate: u32,
}

impl Default for XttsConfig {
    fn default() -> Self {
        Self {
            command: "xtts".to_string(),
            model_dir: None,
            timeout: Duration::from_secs(60),
            sample_rate: 24_000,
        }
    }
}

pub struct XttsEngine {
    config: XttsConfig,
}

impl XttsEngine {
    pub fn new(config: XttsConfig) -> Self {
        Self { config }
    }

    /// Build the CLI argument list for one synthesis call
    fn build_args(&self, text: &str, speaker_wav: &PathBuf, params: &SynthesisParams) -> Vec<String> {
        let mut args = vec![
            "--stdout".to_string(),
            "--text".to_string(),
            text.to_string(),
            "--speaker-wav".to_string(),
            speaker_wav.display().to_string(),
            "--language".to_string(),
            params.language.clone(),
            "--speed".to_string(),
            format!("{:.2}", params.speed),
        ];

        if let Some(dir) = &self.config.model_dir {
            args.push("--model-dir".to_string());
            args.push(dir.display().to_string());
        }

        args
    }

    fn speaker_wav<'a>(&self, voice: &'a VoiceDescriptor) -> SynthesisResult<&'a PathBuf> {
        match &voice.reference {
            VoiceRef::SampleFile(path) => Ok(path),
            VoiceRef::RemoteVoice(id) => Err(SynthesisError::InvalidVoice(format!(
                "remote voice {} has no local speaker sample",
                id
            ))),
        }
    }

    /// WAV payload duration from the raw byte length, assuming 16-bit
    /// samples and the configured rate.
    fn wav_duration_ms(&self, data_len: usize, channels: u16) -> Option<u64> {
        let payload = data_len.checked_sub(44)? as u64;
        let bytes_per_sec = u64::from(self.config.sample_rate) * u64::from(channels) * 2;
        if bytes_per_sec == 0 {
            return None;
        }
        Some(payload * 1000 / bytes_per_sec)
    }
}

#[async_trait]
impl SynthesisBackend for XttsEngine {
    fn id(&self) -> EngineId {
        EngineId::Xtts
    }

    fn name(&self) -> &str {
        "XTTS"
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.config.command)
            .arg("--version")
            .output()
            .await
            .is_ok()
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

        let local = self.translate_voice(voice)?;
        let speaker_wav = self.speaker_wav(&local)?;
        let args = self.build_args(text, speaker_wav, params);

        debug!("Running xtts synthesis: {} {:?}", self.config.command, args);

        let started = std::time::Instant::now();
        let output = tokio::time::timeout(
            self.config.timeout,
            Command::new(&self.config.command).args(&args).output(),
        )
        .await
        .map_err(|_| SynthesisError::Timeout {
            elapsed: started.elapsed(),
        })?
        .map_err(|e| {
            error!("Failed to execute xtts: {}", e);
            SynthesisError::BackendUnavailable(format!("{}: {}", self.config.command, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("xtts synthesis failed: {}", stderr);
            let lower = stderr.to_lowercase();
            if lower.contains("speaker") || lower.contains("voice") {
                return Err(SynthesisError::InvalidVoice(stderr.trim().to_string()));
            }
            return Err(SynthesisError::BackendUnavailable(
                stderr.trim().to_string(),
            ));
        }

        let bytes = output.stdout;
        if bytes.is_empty() {
            return Err(SynthesisError::BackendUnavailable(
                "no audio data generated".to_string(),
            ));
        }

        debug!(
            "xtts synthesis done: {} bytes in {:?}",
            bytes.len(),
            started.elapsed()
        );

        let duration_ms = self.wav_duration_ms(bytes.len(), 1);
        Ok(AudioData {
            bytes,
            format: AudioFormat::Wav,
            sample_rate: self.config.sample_rate,
            channels: 1,
            duration_ms,
        })
    }

    fn translate_voice(&self, voice: &VoiceDescriptor) -> SynthesisResult<VoiceDescriptor> {
        match (&voice.engine, &voice.reference) {
            (EngineId::Xtts, VoiceRef::SampleFile(_)) => Ok(voice.clone()),
            // Any descriptor that still carries its uploaded sample can
            // condition the local model; the result is approximate.
            (_, _) => match &voice.source_sample {
                Some(sample) => Ok(VoiceDescriptor::sample_file(sample.clone())),
                None => Err(SynthesisError::InvalidVoice(format!(
                    "voice {} has no source sample to condition on",
                    voice.cache_key()
                ))),
            },
        }
    }
}
