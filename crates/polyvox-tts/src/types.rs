//! Core types for speech-synthesis requests and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Identity of a synthesis engine, selected per request.
///
/// Selection happens by identity, never by downcasting a backend object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    /// Local XTTS-style model, conditioned on a speaker sample
    Xtts,
    /// Premium cloud engine addressed by a remote voice id
    ElevenLabs,
}

impl EngineId {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineId::Xtts => "xtts",
            EngineId::ElevenLabs => "elevenlabs",
        }
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xtts" | "local" => Ok(EngineId::Xtts),
            "elevenlabs" | "eleven" | "cloud" => Ok(EngineId::ElevenLabs),
            other => Err(format!("unknown engine: {}", other)),
        }
    }
}

/// Engine-specific reference to a voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceRef {
    /// Path to a speaker sample the local model conditions on
    SampleFile(PathBuf),
    /// Remote voice id known to the cloud engine
    RemoteVoice(String),
}

/// A voice as one engine understands it, plus enough provenance to
/// attempt translation for the other engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    /// Engine the descriptor was created for
    pub engine: EngineId,
    pub reference: VoiceRef,
    /// Original uploaded sample, when one exists. Cross-engine
    /// translation to the local model conditions on this.
    pub source_sample: Option<PathBuf>,
}

impl VoiceDescriptor {
    pub fn sample_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            engine: EngineId::Xtts,
            reference: VoiceRef::SampleFile(path.clone()),
            source_sample: Some(path),
        }
    }

    pub fn remote_voice(voice_id: impl Into<String>) -> Self {
        Self {
            engine: EngineId::ElevenLabs,
            reference: VoiceRef::RemoteVoice(voice_id.into()),
            source_sample: None,
        }
    }

    pub fn with_source_sample(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_sample = Some(path.into());
        self
    }

    /// Stable identity string, hashed into the cache fingerprint.
    pub fn cache_key(&self) -> String {
        match &self.reference {
            VoiceRef::SampleFile(path) => format!("{}:file:{}", self.engine, path.display()),
            VoiceRef::RemoteVoice(id) => format!("{}:voice:{}", self.engine, id),
        }
    }
}

/// Tunable synthesis parameters; part of the cache fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    /// Language code (e.g. "en")
    pub language: String,
    /// Speaking speed multiplier (1.0 is normal)
    pub speed: f32,
    /// Cloud-engine stability (0.0-1.0)
    pub stability: Option<f32>,
    /// Cloud-engine similarity boost (0.0-1.0)
    pub similarity_boost: Option<f32>,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            speed: 1.1, // slight speed-up reads naturally in a busy channel
            stability: Some(0.5),
            similarity_boost: Some(0.75),
        }
    }
}

impl SynthesisParams {
    /// Canonical byte form for fingerprinting. Floats are hashed by bit
    /// pattern so the key never depends on formatting.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.language.len() + 16);
        out.extend_from_slice(self.language.as_bytes());
        out.push(0);
        out.extend_from_slice(&self.speed.to_bits().to_le_bytes());
        out.extend_from_slice(&self.stability.map_or(u32::MAX, f32::to_bits).to_le_bytes());
        out.extend_from_slice(
            &self
                .similarity_boost
                .map_or(u32::MAX, f32::to_bits)
                .to_le_bytes(),
        );
        out
    }
}

/// Audio container format produced by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

/// Encoded audio returned by a synthesis backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioData {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u16,
    /// Playback duration when the backend can determine it
    pub duration_ms: Option<u64>,
}

impl AudioData {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Admission tier. Administrators are admitted before normal traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Normal,
    Administrator,
}

impl PriorityTier {
    /// Rank used for admission ordering; lower is admitted first.
    pub fn rank(&self) -> u8 {
        match self {
            PriorityTier::Administrator => 0,
            PriorityTier::Normal => 1,
        }
    }
}

/// Platform-neutral requester identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One utterance request. Immutable once created.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub id: u64,
    pub user: UserId,
    pub text: String,
    pub engine: EngineId,
    /// Explicit voice override; absent means "use the requester's profile"
    pub voice_override: Option<VoiceDescriptor>,
    pub priority: PriorityTier,
    pub submitted_at: DateTime<Utc>,
}

impl SynthesisRequest {
    pub fn new(user: impl Into<UserId>, text: impl Into<String>, engine: EngineId) -> Self {
        Self {
            id: crate::next_request_id(),
            user: user.into(),
            text: text.into(),
            engine,
            voice_override: None,
            priority: PriorityTier::Normal,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: PriorityTier) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_voice(mut self, voice: VoiceDescriptor) -> Self {
        self.voice_override = Some(voice);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_id_round_trip() {
        assert_eq!("xtts".parse::<EngineId>().unwrap(), EngineId::Xtts);
        assert_eq!(
            "ElevenLabs".parse::<EngineId>().unwrap(),
            EngineId::ElevenLabs
        );
        assert!("festival".parse::<EngineId>().is_err());
        assert_eq!(EngineId::Xtts.to_string(), "xtts");
    }

    #[test]
    fn cache_key_distinguishes_engines_and_refs() {
        let local = VoiceDescriptor::sample_file("/samples/u1.wav");
        let cloud = VoiceDescriptor::remote_voice("abc123");
        assert_ne!(local.cache_key(), cloud.cache_key());
        assert!(local.cache_key().starts_with("xtts:file:"));
        assert!(cloud.cache_key().starts_with("elevenlabs:voice:"));
    }

    #[test]
    fn canonical_params_are_stable() {
        let a = SynthesisParams::default();
        let b = SynthesisParams::default();
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());

        let c = SynthesisParams {
            speed: 1.2,
            ..SynthesisParams::default()
        };
        assert_ne!(a.canonical_bytes(), c.canonical_bytes());
    }

    #[test]
    fn request_ids_are_unique() {
        let a = SynthesisRequest::new("u1", "hello", EngineId::Xtts);
        let b = SynthesisRequest::new("u1", "hello", EngineId::Xtts);
        assert_ne!(a.id, b.id);
    }
}
