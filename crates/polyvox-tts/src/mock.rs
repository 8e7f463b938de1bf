//! Mock synthesis backend for testing

use crate::engine::SynthesisBackend;
use crate::error::{SynthesisError, SynthesisResult};
use crate::types::{AudioData, AudioFormat, EngineId, SynthesisParams, VoiceDescriptor};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Configuration for scripted mock synthesis
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Engine identity the mock reports
    pub engine: EngineId,
    /// Bytes returned on success
    pub audio_bytes: Vec<u8>,
    /// Fail every call with this error
    pub fail_with: Option<SynthesisError>,
    /// Fail only after N successful calls
    pub fail_after_calls: Option<usize>,
    /// Simulated processing delay in ms
    pub processing_delay_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            engine: EngineId::Xtts,
            audio_bytes: vec![0u8; 64],
            fail_with: None,
            fail_after_calls: None,
            processing_delay_ms: 0,
        }
    }
}

/// Scripted backend used by queue and orchestrator tests.
///
/// Counts synthesize calls so dedup tests can assert "exactly one
/// backend call for N concurrent submissions".
pub struct MockBackend {
    config: MockConfig,
    calls: Arc<AtomicUsize>,
    texts: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            calls: Arc::new(AtomicUsize::new(0)),
            texts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_audio(engine: EngineId, bytes: Vec<u8>) -> Self {
        Self::new(MockConfig {
            engine,
            audio_bytes: bytes,
            ..Default::default()
        })
    }

    pub fn failing_with(engine: EngineId, error: SynthesisError) -> Self {
        Self::new(MockConfig {
            engine,
            fail_with: Some(error),
            ..Default::default()
        })
    }

    /// Shared call counter; clone before handing the backend off.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared log of synthesized texts, in call order.
    pub fn text_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.texts)
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts.lock().unwrap().last().cloned()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

#[async_trait]
impl SynthesisBackend for MockBackend {
    fn id(&self) -> EngineId {
        self.config.engine
    }

    fn name(&self) -> &str {
        "Mock"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn synthesize(
        &mut self,
        text: &str,
        _voice: &VoiceDescriptor,
        _params: &SynthesisParams,
    ) -> SynthesisResult<AudioData> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());

        if self.config.processing_delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(
                self.config.processing_delay_ms,
            ))
            .await;
        }

        if let Some(err) = &self.config.fail_with {
            return Err(err.clone());
        }
        if let Some(after) = self.config.fail_after_calls {
            if call >= after {
                return Err(SynthesisError::BackendUnavailable(
                    "simulated failure".to_string(),
                ));
            }
        }

        Ok(AudioData {
            bytes: self.config.audio_bytes.clone(),
            format: AudioFormat::Wav,
            sample_rate: 24_000,
            channels: 1,
            duration_ms: Some(self.config.audio_bytes.len() as u64 / 48),
        })
    }

    fn translate_voice(&self, voice: &VoiceDescriptor) -> SynthesisResult<VoiceDescriptor> {
        Ok(voice.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_calls_and_records_text() {
        let mut backend = MockBackend::default();
        let voice = VoiceDescriptor::sample_file("/tmp/v.wav");
        let params = SynthesisParams::default();

        let audio = backend.synthesize("hello", &voice, &params).await.unwrap();
        assert!(!audio.is_empty());
        assert_eq!(backend.calls(), 1);
        assert_eq!(backend.last_text().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn scripted_failure_is_returned() {
        let mut backend = MockBackend::failing_with(
            EngineId::ElevenLabs,
            SynthesisError::RateLimited { retry_after: None },
        );
        let voice = VoiceDescriptor::remote_voice("v1");
        let err = backend
            .synthesize("hello", &voice, &SynthesisParams::default())
            .await
            .unwrap_err();
        assert_eq!(err, SynthesisError::RateLimited { retry_after: None });
    }

    #[tokio::test]
    async fn fails_after_configured_calls() {
        let mut backend = MockBackend::new(MockConfig {
            fail_after_calls: Some(1),
            ..Default::default()
        });
        let voice = VoiceDescriptor::sample_file("/tmp/v.wav");
        let params = SynthesisParams::default();

        assert!(backend.synthesize("one", &voice, &params).await.is_ok());
        assert!(backend.synthesize("two", &voice, &params).await.is_err());
    }
}
