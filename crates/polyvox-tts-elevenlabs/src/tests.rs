//! Tests for the ElevenLabs adapter

#[cfg(test)]
mod tests {
    use crate::{ElevenLabsConfig, ElevenLabsEngine};
    use polyvox_tts::{
        EngineId, SynthesisBackend, SynthesisError, SynthesisParams, VoiceDescriptor,
    };
    use std::time::Duration;

    #[test]
    fn engine_identity() {
        let engine = ElevenLabsEngine::new(ElevenLabsConfig::default());
        assert_eq!(engine.id(), EngineId::ElevenLabs);
        assert_eq!(engine.name(), "ElevenLabs");
    }

    #[test]
    fn status_mapping_covers_taxonomy() {
        let err = ElevenLabsEngine::map_status(429, Some(Duration::from_secs(7)), "slow down");
        assert_eq!(
            err,
            SynthesisError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );

        let err = ElevenLabsEngine::map_status(404, None, "voice not found");
        assert!(matches!(err, SynthesisError::InvalidVoice(_)));

        let err = ElevenLabsEngine::map_status(422, None, "text too long");
        assert!(matches!(err, SynthesisError::InvalidInput(_)));

        let err = ElevenLabsEngine::map_status(503, None, "maintenance");
        assert!(matches!(err, SynthesisError::BackendUnavailable(_)));
    }

    #[test]
    fn translate_keeps_native_descriptor() {
        let engine = ElevenLabsEngine::new(ElevenLabsConfig::default());
        let voice = VoiceDescriptor::remote_voice("abc123");
        assert_eq!(engine.translate_voice(&voice).unwrap(), voice);
    }

    #[test]
    fn translate_from_sample_fails_invalid_voice() {
        let engine = ElevenLabsEngine::new(ElevenLabsConfig::default());
        let voice = VoiceDescriptor::sample_file("/samples/u1.wav");
        match engine.translate_voice(&voice) {
            Err(SynthesisError::InvalidVoice(_)) => {}
            other => panic!("expected InvalidVoice, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unavailable_without_api_key() {
        let engine = ElevenLabsEngine::new(ElevenLabsConfig::default());
        assert!(!engine.is_available().await);
    }

    #[tokio::test]
    async fn synthesize_without_key_fails_fast() {
        let mut engine = ElevenLabsEngine::new(ElevenLabsConfig::default());
        let voice = VoiceDescriptor::remote_voice("abc123");
        let err = engine
            .synthesize("hello", &voice, &SynthesisParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::BackendUnavailable(_)));
    }
}
