//! Speech-synthesis abstraction layer for polyvox
//!
//! This crate provides the foundational types and traits shared by the
//! synthesis backends, the admission queue, and the cache: voice
//! descriptors, synthesis parameters, the error taxonomy, and the
//! backend capability trait.

use std::sync::atomic::{AtomicU64, Ordering};

pub mod engine;
pub mod error;
pub mod mock;
pub mod types;

pub use engine::{EngineSet, SynthesisBackend};
pub use error::{SynthesisError, SynthesisResult};
pub use types::{
    AudioData, AudioFormat, EngineId, PriorityTier, SynthesisParams, SynthesisRequest, UserId,
    VoiceDescriptor, VoiceRef,
};

/// Generates unique request IDs
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID
pub fn next_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}
