//! The admitted-slot executor: one synthesis at a time against the
//! exclusively owned engine set

use crate::queue::{AdmissionQueue, SynthesisJob};
use polyvox_cache::{normalize_text, AudioArtifact, CacheStore, Fingerprint};
use polyvox_telemetry::CoreMetrics;
use polyvox_tts::EngineSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runs admitted queue entries against the shared synthesis resource.
///
/// Owning the [`EngineSet`] is owning the resource: there is exactly
/// one worker task, so at most one synthesis call is in flight
/// system-wide. Results land in the cache before any waiter is
/// signaled, so a concurrent lookup can never observe a completed
/// entry that is absent from the cache.
pub struct SynthesisWorker {
    queue: AdmissionQueue,
    engines: EngineSet,
    cache: Arc<CacheStore>,
    metrics: CoreMetrics,
}

impl SynthesisWorker {
    pub fn new(
        queue: AdmissionQueue,
        engines: EngineSet,
        cache: Arc<CacheStore>,
        metrics: CoreMetrics,
    ) -> Self {
        Self {
            queue,
            engines,
            cache,
            metrics,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Synthesis worker started");
        loop {
            let Some((fingerprint, job)) = self.queue.take_next() else {
                self.queue.shared.notify.notified().await;
                continue;
            };
            self.execute(fingerprint, job).await;
        }
    }

    async fn execute(&mut self, fingerprint: Fingerprint, job: SynthesisJob) {
        let engine_id = job.request.engine;
        let backend = self.engines.for_engine(engine_id);

        let voice = match backend.translate_voice(&job.voice) {
            Ok(voice) => voice,
            Err(e) => {
                warn!(
                    "Voice translation failed for {} on {}: {}",
                    fingerprint, engine_id, e
                );
                self.queue.fail(fingerprint, e);
                return;
            }
        };

        debug!(
            "Admitted {} for user {} on {}",
            fingerprint, job.request.user, engine_id
        );

        let started = Instant::now();
        match backend
            .synthesize(&job.request.text, &voice, &job.params)
            .await
        {
            Ok(audio) => {
                let elapsed = started.elapsed();
                let artifact = AudioArtifact::new(
                    fingerprint,
                    normalize_text(&job.request.text),
                    engine_id,
                    audio,
                );
                // Cache first, then signal: waiters and late lookups
                // must agree on one stored artifact.
                let stored = self.cache.put(artifact);
                self.metrics.observe_synthesis(elapsed, true);
                info!(
                    "Synthesized {} ({} bytes in {:?})",
                    fingerprint,
                    stored.audio.bytes.len(),
                    elapsed
                );
                self.queue.complete(fingerprint, stored);
            }
            Err(e) => {
                self.metrics.observe_synthesis(started.elapsed(), false);
                warn!("Synthesis failed for {}: {}", fingerprint, e);
                self.queue.fail(fingerprint, e);
            }
        }
    }
}
