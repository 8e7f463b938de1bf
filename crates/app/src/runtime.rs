//! Runtime wiring: build the core, own its tasks, shut down cleanly

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use polyvox_cache::{CacheCapacity, CacheStore};
use polyvox_foundation::{AppError, AppState, StateManager};
use polyvox_scheduler::{AdmissionQueue, SynthesisWorker};
use polyvox_telemetry::CoreMetrics;
use polyvox_tts::{EngineSet, SynthesisParams, UserId, VoiceDescriptor};
use polyvox_tts_elevenlabs::{ElevenLabsConfig, ElevenLabsEngine};
use polyvox_tts_xtts::{XttsConfig, XttsEngine};
use polyvox_voices::{VoiceRegistry, VoiceSample};

use crate::config::AppConfig;
use crate::orchestrator::{CoreError, Orchestrator};
use crate::status::StatusReport;

/// Handle to the running synthesis core
pub struct AppHandle {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<VoiceRegistry>,
    pub metrics: CoreMetrics,
    pub state: StateManager,
    /// Separate cloud client for voice cloning; account mutations do
    /// not contend with the synthesis slot the worker owns.
    cloner: ElevenLabsEngine,
    queue: AdmissionQueue,
    cache: Arc<CacheStore>,
    worker_handle: JoinHandle<()>,
}

/// Build every component and start the synthesis worker.
pub fn start(config: &AppConfig, elevenlabs_api_key: Option<String>) -> Result<AppHandle, AppError> {
    let state = StateManager::new();
    let metrics = CoreMetrics::new();

    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| AppError::Storage(format!("{}: {}", config.output_dir.display(), e)))?;

    let cache = Arc::new(
        CacheStore::open(
            config.data_dir.join("cache"),
            CacheCapacity {
                max_entries: config.cache.max_entries,
                max_bytes: config.cache_max_bytes(),
            },
            metrics.clone(),
        )
        .map_err(|e| AppError::Storage(e.to_string()))?,
    );

    let registry = Arc::new(
        VoiceRegistry::open(
            config.data_dir.join("voices"),
            config.backup_limit,
            metrics.clone(),
        )
        .map_err(|e| AppError::Storage(e.to_string()))?,
    );

    let eleven_config = ElevenLabsConfig {
        api_key: elevenlabs_api_key.unwrap_or_default(),
        model_id: config.elevenlabs.model_id.clone(),
        timeout: config.elevenlabs_timeout(),
        ..Default::default()
    };

    let engines = EngineSet::new(
        Box::new(XttsEngine::new(XttsConfig {
            command: config.xtts.command.clone(),
            model_dir: config.xtts.model_dir.clone(),
            timeout: config.xtts_timeout(),
            sample_rate: config.xtts.sample_rate,
        })),
        Box::new(ElevenLabsEngine::new(eleven_config.clone())),
    );

    let queue = AdmissionQueue::new(metrics.clone());
    let worker_handle = SynthesisWorker::new(
        queue.clone(),
        engines,
        Arc::clone(&cache),
        metrics.clone(),
    )
    .spawn();

    let default_voice = config
        .default_voice
        .as_ref()
        .map(|path| VoiceDescriptor::sample_file(path.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&cache),
        Arc::clone(&registry),
        queue.clone(),
        default_voice,
        SynthesisParams::default(),
        config.max_text_length,
        config.max_repeat_chars,
    ));

    state.transition(AppState::Running)?;
    info!("polyvox core started (data dir: {})", config.data_dir.display());

    Ok(AppHandle {
        orchestrator,
        registry,
        metrics,
        state,
        cloner: ElevenLabsEngine::new(eleven_config),
        queue,
        cache,
        worker_handle,
    })
}

impl AppHandle {
    pub fn status(&self) -> StatusReport {
        StatusReport::collect(&self.queue, &self.cache, &self.metrics, 3)
    }

    /// Clone a sample into the cloud engine and record the resulting
    /// voice as a new profile version.
    pub async fn clone_cloud_voice(
        &self,
        user: &UserId,
        name: &str,
        sample: &VoiceSample,
    ) -> Result<VoiceDescriptor, CoreError> {
        let voice_id = self.cloner.clone_voice(name, sample.path()).await?;
        Ok(self
            .registry
            .register_remote(user, &voice_id, Some(sample), Some(name.to_string()))
            .await?)
    }

    /// Graceful shutdown: drain (stop accepting, let an admitted call
    /// finish), then stop the worker.
    pub async fn shutdown(self) -> Result<(), AppError> {
        info!("Shutting down polyvox core...");
        self.state.transition(AppState::Draining)?;

        let drained = tokio::time::timeout(Duration::from_secs(10), async {
            while self.queue.status().admitted.is_some() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await
        .is_ok();
        if !drained {
            info!("Admitted synthesis still running at shutdown; aborting it");
        }

        let dropped = self.queue.clear();
        if dropped > 0 {
            info!("Cancelled {} pending requests at shutdown", dropped);
        }

        self.state.transition(AppState::Stopping)?;
        self.worker_handle.abort();
        let _ = self.worker_handle.await;
        self.state.transition(AppState::Stopped)?;
        info!("Shutdown complete");
        Ok(())
    }
}
