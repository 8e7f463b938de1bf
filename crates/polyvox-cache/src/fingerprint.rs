//! Deterministic fingerprints over synthesis inputs

use polyvox_tts::{EngineId, SynthesisParams, VoiceDescriptor};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Cache key and in-flight de-duplication key: a Sha256 digest of the
/// normalized text, voice identity, engine identity, and canonical
/// synthesis parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint for one synthesis input tuple.
    ///
    /// `text` is expected to already be normalized (see
    /// [`normalize_text`]); fields are separated by NUL so adjacent
    /// inputs can never collide by concatenation.
    pub fn compute(
        text: &str,
        voice: &VoiceDescriptor,
        engine: EngineId,
        params: &SynthesisParams,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
        hasher.update(voice.cache_key().as_bytes());
        hasher.update([0u8]);
        hasher.update(engine.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(params.canonical_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(format!("fingerprint must be 64 hex chars, got {}", s.len()));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk).map_err(|e| e.to_string())?;
            bytes[i] = u8::from_str_radix(hex, 16).map_err(|e| e.to_string())?;
        }
        Ok(Self(bytes))
    }
}

/// Canonical text form shared by the fingerprint and the popularity
/// analytics: trimmed, lowercased, internal whitespace collapsed.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
