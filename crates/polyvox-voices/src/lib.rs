//! Versioned voice profile registry for polyvox
//!
//! Tracks each user's active voice, its full version history, and the
//! backup chain behind replace/restore. Mutations for one user are
//! serialized; different users proceed in parallel.

pub mod error;
pub mod profile;
pub mod registry;
pub mod sample;

pub use error::ProfileError;
pub use profile::{VersionEntry, VersionId, VoiceProfile};
pub use registry::VoiceRegistry;
pub use sample::{SampleFormat, VoiceSample};
