//! End-to-end orchestrator behavior over a mock backend

use polyvox_app::orchestrator::{CoreError, Orchestrator};
use polyvox_cache::{CacheCapacity, CacheStore};
use polyvox_scheduler::{AdmissionQueue, SynthesisWorker};
use polyvox_telemetry::CoreMetrics;
use polyvox_tts::mock::{MockBackend, MockConfig};
use polyvox_tts::{
    EngineId, EngineSet, SynthesisError, SynthesisParams, SynthesisRequest, UserId,
    VoiceDescriptor,
};
use polyvox_voices::{VoiceRegistry, VoiceSample};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct TestCore {
    orchestrator: Arc<Orchestrator>,
    cache: Arc<CacheStore>,
    registry: Arc<VoiceRegistry>,
    metrics: CoreMetrics,
    calls: Arc<AtomicUsize>,
    texts: Arc<std::sync::Mutex<Vec<String>>>,
    worker: tokio::task::JoinHandle<()>,
    _tmp: tempfile::TempDir,
}

fn core(backend: MockBackend, default_voice: Option<VoiceDescriptor>) -> TestCore {
    let tmp = tempfile::tempdir().unwrap();
    let metrics = CoreMetrics::new();
    let cache = Arc::new(CacheStore::new(CacheCapacity::default(), metrics.clone()));
    let registry = Arc::new(
        VoiceRegistry::open(tmp.path().join("voices"), 5, metrics.clone()).unwrap(),
    );
    let queue = AdmissionQueue::new(metrics.clone());

    let calls = backend.call_counter();
    let texts = backend.text_log();
    let engines = EngineSet::new(
        Box::new(backend),
        Box::new(MockBackend::with_audio(EngineId::ElevenLabs, vec![7u8; 8])),
    );
    let worker = SynthesisWorker::new(
        queue.clone(),
        engines,
        Arc::clone(&cache),
        metrics.clone(),
    )
    .spawn();

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&cache),
        Arc::clone(&registry),
        queue,
        default_voice,
        SynthesisParams::default(),
        500,
        5,
    ));

    TestCore {
        orchestrator,
        cache,
        registry,
        metrics,
        calls,
        texts,
        worker,
        _tmp: tmp,
    }
}

fn override_voice() -> VoiceDescriptor {
    VoiceDescriptor::sample_file("/samples/override.wav")
}

fn request(user: &str, text: &str) -> SynthesisRequest {
    SynthesisRequest::new(user, text, EngineId::Xtts).with_voice(override_voice())
}

fn write_wav(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22_050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..2_048u32 {
        writer.write_sample((i % 64) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

#[tokio::test]
async fn second_identical_request_is_a_cache_hit() {
    let core = core(MockBackend::default(), None);

    let first = core.orchestrator.handle(request("u1", "hello")).await.unwrap();
    let second = core.orchestrator.handle(request("u1", "hello")).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(core.calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.hits(), 1);
    assert_eq!(core.metrics.snapshot().cache_hits, 1);
    core.worker.abort();
}

#[tokio::test]
async fn concurrent_identical_requests_synthesize_once() {
    let core = core(
        MockBackend::new(MockConfig {
            processing_delay_ms: 20,
            ..Default::default()
        }),
        None,
    );

    let mut tasks = Vec::new();
    for i in 0..5 {
        let orchestrator = Arc::clone(&core.orchestrator);
        tasks.push(tokio::spawn(async move {
            orchestrator
                .handle(request(&format!("user{}", i), "same phrase"))
                .await
                .unwrap()
        }));
    }

    let mut artifacts = Vec::new();
    for task in tasks {
        artifacts.push(task.await.unwrap());
    }
    for pair in artifacts.windows(2) {
        assert!(Arc::ptr_eq(&pair[0], &pair[1]));
    }
    assert_eq!(core.calls.load(Ordering::SeqCst), 1);
    core.worker.abort();
}

#[tokio::test]
async fn normalized_variants_share_a_fingerprint() {
    let core = core(MockBackend::default(), None);

    core.orchestrator
        .handle(request("u1", "Hello  There"))
        .await
        .unwrap();
    core.orchestrator
        .handle(request("u2", "hello there"))
        .await
        .unwrap();

    assert_eq!(core.calls.load(Ordering::SeqCst), 1);
    core.worker.abort();
}

#[tokio::test]
async fn empty_text_is_rejected() {
    let core = core(MockBackend::default(), None);
    let err = core
        .orchestrator
        .handle(request("u1", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidText(_)));
    assert_eq!(core.calls.load(Ordering::SeqCst), 0);
    core.worker.abort();
}

#[tokio::test]
async fn long_character_runs_are_collapsed() {
    let core = core(MockBackend::default(), None);
    core.orchestrator
        .handle(request("u1", "yoooooooo"))
        .await
        .unwrap();
    assert_eq!(
        core.texts.lock().unwrap().last().map(String::as_str),
        Some("yooooo")
    );
    core.worker.abort();
}

#[tokio::test]
async fn missing_voice_without_default_is_invalid_voice() {
    let core = core(MockBackend::default(), None);
    let req = SynthesisRequest::new("u1", "hello", EngineId::Xtts);
    let err = core.orchestrator.handle(req).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Synthesis(SynthesisError::InvalidVoice(_))
    ));
    core.worker.abort();
}

#[tokio::test]
async fn default_voice_backs_users_without_a_profile() {
    let core = core(
        MockBackend::default(),
        Some(VoiceDescriptor::sample_file("/samples/default.wav")),
    );
    let req = SynthesisRequest::new("u1", "hello", EngineId::Xtts);
    let artifact = core.orchestrator.handle(req).await.unwrap();
    assert!(!artifact.audio.is_empty());
    core.worker.abort();
}

#[tokio::test]
async fn uploaded_profile_voice_changes_the_fingerprint() {
    let core = core(MockBackend::default(), None);
    let sample = write_wav(core._tmp.path(), "sample.wav");

    core.registry
        .upload(&UserId::new("u1"), &VoiceSample::new(&sample), None)
        .await
        .unwrap();
    core.registry
        .upload(&UserId::new("u2"), &VoiceSample::new(&sample), None)
        .await
        .unwrap();

    let req1 = SynthesisRequest::new("u1", "hello", EngineId::Xtts);
    let req2 = SynthesisRequest::new("u2", "hello", EngineId::Xtts);
    let a1 = core.orchestrator.handle(req1).await.unwrap();
    let a2 = core.orchestrator.handle(req2).await.unwrap();

    // Different voices, same text: two distinct artifacts
    assert_ne!(a1.fingerprint, a2.fingerprint);
    assert_eq!(core.calls.load(Ordering::SeqCst), 2);
    assert_eq!(core.cache.stats().entries, 2);
    core.worker.abort();
}

#[tokio::test]
async fn backend_failure_reports_the_specific_reason() {
    let core = core(
        MockBackend::failing_with(
            EngineId::Xtts,
            SynthesisError::RateLimited { retry_after: None },
        ),
        None,
    );
    let err = core
        .orchestrator
        .handle(request("u1", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Synthesis(SynthesisError::RateLimited { .. })
    ));
    // A failed entry never reaches the cache
    assert_eq!(core.cache.stats().entries, 0);
    core.worker.abort();
}
