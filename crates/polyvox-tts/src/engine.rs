//! Synthesis backend capability trait and the engine set

use crate::error::SynthesisResult;
use crate::types::{AudioData, EngineId, SynthesisParams, VoiceDescriptor};
use async_trait::async_trait;

/// Core synthesis backend interface.
///
/// Implementations wrap one concrete engine (local model, cloud API) and
/// normalize its failures onto [`crate::SynthesisError`]. A synthesize
/// call is attributed to exactly one shared compute resource, so callers
/// hold the backend exclusively (`&mut self`) for the duration.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Engine identity this backend implements
    fn id(&self) -> EngineId;

    /// Human-readable engine name
    fn name(&self) -> &str;

    /// Check whether the engine can currently serve requests
    async fn is_available(&self) -> bool;

    /// Synthesize text with the given voice and parameters
    async fn synthesize(
        &mut self,
        text: &str,
        voice: &VoiceDescriptor,
        params: &SynthesisParams,
    ) -> SynthesisResult<AudioData>;

    /// Translate a descriptor created under any engine into one this
    /// backend can use. Translation is approximate; when no faithful
    /// translation exists this fails with `InvalidVoice` rather than
    /// degrading silently.
    fn translate_voice(&self, voice: &VoiceDescriptor) -> SynthesisResult<VoiceDescriptor>;
}

/// The two interchangeable backends, selected by engine identity.
///
/// Owned exclusively by the admission worker: holding the set is holding
/// the shared synthesis resource.
pub struct EngineSet {
    xtts: Box<dyn SynthesisBackend>,
    elevenlabs: Box<dyn SynthesisBackend>,
}

impl EngineSet {
    pub fn new(xtts: Box<dyn SynthesisBackend>, elevenlabs: Box<dyn SynthesisBackend>) -> Self {
        Self { xtts, elevenlabs }
    }

    pub fn for_engine(&mut self, id: EngineId) -> &mut dyn SynthesisBackend {
        match id {
            EngineId::Xtts => self.xtts.as_mut(),
            EngineId::ElevenLabs => self.elevenlabs.as_mut(),
        }
    }

    pub fn get(&self, id: EngineId) -> &dyn SynthesisBackend {
        match id {
            EngineId::Xtts => self.xtts.as_ref(),
            EngineId::ElevenLabs => self.elevenlabs.as_ref(),
        }
    }
}
