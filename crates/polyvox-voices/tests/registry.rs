//! Registry integration tests: versioning, persistence, concurrency

use polyvox_telemetry::CoreMetrics;
use polyvox_tts::{EngineId, UserId, VoiceRef};
use polyvox_voices::{ProfileError, VersionId, VoiceRegistry, VoiceSample};
use std::path::{Path, PathBuf};

fn write_wav(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22_050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..4_096u32 {
        writer.write_sample((i % 256) as i16 - 128).unwrap();
    }
    writer.finalize().unwrap();
    path
}

#[tokio::test]
async fn upload_replace_restore_history() {
    let dir = tempfile::tempdir().unwrap();
    let registry = VoiceRegistry::open(dir.path().join("voices"), 5, CoreMetrics::new()).unwrap();
    let user = UserId::new("u1");

    let s1 = write_wav(dir.path(), "s1.wav");
    let s2 = write_wav(dir.path(), "s2.wav");

    assert!(registry.get_active(&user).await.is_none());

    let v1_desc = registry
        .upload(&user, &VoiceSample::new(&s1), Some("S1".into()))
        .await
        .unwrap();
    assert_eq!(registry.get_active(&user).await, Some(v1_desc.clone()));

    let v2_desc = registry
        .replace(&user, &VoiceSample::new(&s2), Some("S2".into()))
        .await
        .unwrap();
    assert_eq!(registry.get_active(&user).await, Some(v2_desc.clone()));

    // [v2, v1] newest-first, v1 retained as backup
    let history = registry.history(&user).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].descriptor, v2_desc);
    assert_eq!(history[1].descriptor, v1_desc);

    let v1_id = history[1].id;
    let restored = registry.restore(&user, v1_id).await.unwrap();
    assert_eq!(restored, v1_desc);
    assert_eq!(registry.get_active(&user).await, Some(v1_desc));

    // Restore deleted nothing and created nothing
    let history = registry.history(&user).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].descriptor, v2_desc);
}

#[tokio::test]
async fn restore_unknown_version_fails() {
    let dir = tempfile::tempdir().unwrap();
    let registry = VoiceRegistry::open(dir.path().join("voices"), 5, CoreMetrics::new()).unwrap();
    let user = UserId::new("u1");

    let err = registry.restore(&user, VersionId(42)).await.unwrap_err();
    assert!(matches!(err, ProfileError::VersionNotFound(v) if v == VersionId(42)));
}

#[tokio::test]
async fn invalid_sample_is_rejected_before_any_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let registry = VoiceRegistry::open(dir.path().join("voices"), 5, CoreMetrics::new()).unwrap();
    let user = UserId::new("u1");

    let bogus = dir.path().join("bogus.wav");
    std::fs::write(&bogus, b"not audio at all").unwrap();

    let err = registry
        .upload(&user, &VoiceSample::new(&bogus), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProfileError::InvalidSample(_)));
    assert!(registry.history(&user).await.is_empty());
}

#[tokio::test]
async fn profiles_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("voices");
    let user = UserId::new("u1");
    let sample = write_wav(dir.path(), "s1.wav");

    let (active, history_len) = {
        let registry = VoiceRegistry::open(&root, 5, CoreMetrics::new()).unwrap();
        registry
            .upload(&user, &VoiceSample::new(&sample), None)
            .await
            .unwrap();
        registry
            .replace(&user, &VoiceSample::new(&sample), None)
            .await
            .unwrap();
        (
            registry.get_active(&user).await,
            registry.history(&user).await.len(),
        )
    };

    let reopened = VoiceRegistry::open(&root, 5, CoreMetrics::new()).unwrap();
    assert_eq!(reopened.get_active(&user).await, active);
    assert_eq!(reopened.history(&user).await.len(), history_len);
}

#[tokio::test]
async fn prune_drops_oldest_backups_only() {
    let dir = tempfile::tempdir().unwrap();
    let registry = VoiceRegistry::open(dir.path().join("voices"), 2, CoreMetrics::new()).unwrap();
    let user = UserId::new("u1");
    let sample = write_wav(dir.path(), "s.wav");

    for _ in 0..5 {
        registry
            .upload(&user, &VoiceSample::new(&sample), None)
            .await
            .unwrap();
    }

    // current + 2 backups
    let history = registry.history(&user).await;
    assert_eq!(history.len(), 3);
    // newest first: v5, v4, v3
    assert_eq!(history[0].id, VersionId(5));
    assert_eq!(history[2].id, VersionId(3));
}

#[tokio::test]
async fn register_remote_keeps_seed_sample_for_translation() {
    let dir = tempfile::tempdir().unwrap();
    let registry = VoiceRegistry::open(dir.path().join("voices"), 5, CoreMetrics::new()).unwrap();
    let user = UserId::new("u1");
    let sample = write_wav(dir.path(), "seed.wav");

    let descriptor = registry
        .register_remote(&user, "voice-abc", Some(&VoiceSample::new(&sample)), None)
        .await
        .unwrap();

    assert_eq!(descriptor.engine, EngineId::ElevenLabs);
    assert!(matches!(descriptor.reference, VoiceRef::RemoteVoice(ref id) if id == "voice-abc"));
    assert!(descriptor.source_sample.is_some());
}

#[tokio::test]
async fn same_user_mutations_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let registry = std::sync::Arc::new(
        VoiceRegistry::open(dir.path().join("voices"), 50, CoreMetrics::new()).unwrap(),
    );
    let sample = write_wav(dir.path(), "s.wav");
    let user = UserId::new("u1");

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let registry = std::sync::Arc::clone(&registry);
        let sample = sample.clone();
        let user = user.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                registry
                    .upload(&user, &VoiceSample::new(&sample), None)
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Interleaved uploads still produce one coherent, gap-free history
    let history = registry.history(&user).await;
    assert_eq!(history.len(), 20);
    let mut ids: Vec<u64> = history.iter().map(|e| e.id.0).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn users_mutate_independently() {
    let dir = tempfile::tempdir().unwrap();
    let registry = std::sync::Arc::new(
        VoiceRegistry::open(dir.path().join("voices"), 5, CoreMetrics::new()).unwrap(),
    );
    let sample = write_wav(dir.path(), "s.wav");

    let mut tasks = Vec::new();
    for i in 0..8 {
        let registry = std::sync::Arc::clone(&registry);
        let sample = sample.clone();
        tasks.push(tokio::spawn(async move {
            let user = UserId::new(format!("user{}", i));
            for _ in 0..3 {
                registry
                    .upload(&user, &VoiceSample::new(&sample), None)
                    .await
                    .unwrap();
            }
            registry.history(&user).await.len()
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap(), 3);
    }
}
