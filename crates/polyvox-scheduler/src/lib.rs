//! Admission and priority queue for polyvox
//!
//! Serializes all synthesis against the single shared model resource:
//! one entry is admitted at a time, administrator traffic first, FIFO
//! within a tier, and concurrent identical requests share one job.

pub mod queue;
pub mod worker;

pub use queue::{AdmissionQueue, AdmittedInfo, JobHandle, QueueStatus, SynthesisJob};
pub use worker::SynthesisWorker;
