//! Application configuration: TOML file with CLI/env overrides

use clap::Parser;
use polyvox_foundation::AppError;
use polyvox_tts::EngineId;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root for all persisted state (cache, voices, logs)
    pub data_dir: PathBuf,
    /// Where the local front end writes synthesized artifacts
    pub output_dir: PathBuf,
    /// Engine used when a request does not name one
    pub default_engine: EngineId,
    /// Fallback speaker sample for users with no profile
    pub default_voice: Option<PathBuf>,
    /// Requests longer than this are truncated
    pub max_text_length: usize,
    /// Runs of one character longer than this are collapsed
    pub max_repeat_chars: usize,
    /// Backup versions retained per user beyond the current voice
    pub backup_limit: usize,
    pub status_interval_secs: u64,
    pub cache: CacheSection,
    pub xtts: XttsSection,
    pub elevenlabs: ElevenLabsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_entries: usize,
    pub max_mb: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct XttsSection {
    pub command: String,
    pub model_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElevenLabsSection {
    pub model_id: String,
    pub timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("data/out"),
            default_engine: EngineId::Xtts,
            default_voice: None,
            max_text_length: 500,
            max_repeat_chars: 5,
            backup_limit: 5,
            status_interval_secs: 30,
            cache: CacheSection::default(),
            xtts: XttsSection::default(),
            elevenlabs: ElevenLabsSection::default(),
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: 512,
            max_mb: 256,
        }
    }
}

impl Default for XttsSection {
    fn default() -> Self {
        Self {
            command: "xtts".to_string(),
            model_dir: None,
            timeout_secs: 60,
            sample_rate: 24_000,
        }
    }
}

impl Default for ElevenLabsSection {
    fn default() -> Self {
        Self {
            model_id: "eleven_turbo_v2_5".to_string(),
            timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load from a TOML file; a missing optional path falls back to
    /// defaults, an explicitly named file must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&raw).map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn xtts_timeout(&self) -> Duration {
        Duration::from_secs(self.xtts.timeout_secs)
    }

    pub fn elevenlabs_timeout(&self) -> Duration {
        Duration::from_secs(self.elevenlabs.timeout_secs)
    }

    pub fn cache_max_bytes(&self) -> u64 {
        self.cache.max_mb * 1024 * 1024
    }
}

/// polyvox: speech-synthesis scheduler for a shared voice channel
#[derive(Debug, Parser)]
#[command(name = "polyvox", version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the configured data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Override the default synthesis engine (xtts | elevenlabs)
    #[arg(long)]
    pub engine: Option<EngineId>,

    /// ElevenLabs API key; empty disables the cloud engine
    #[arg(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub elevenlabs_api_key: Option<String>,
}

impl Cli {
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(engine) = self.engine {
            config.default_engine = engine;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.default_engine, EngineId::Xtts);
        assert_eq!(config.max_text_length, 500);
        assert_eq!(config.cache.max_entries, 512);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            max_text_length = 200

            [xtts]
            command = "/opt/xtts/bin/xtts"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.max_text_length, 200);
        assert_eq!(parsed.xtts.command, "/opt/xtts/bin/xtts");
        assert_eq!(parsed.xtts.timeout_secs, 60);
        assert_eq!(parsed.backup_limit, 5);
    }

    #[test]
    fn missing_named_config_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/polyvox.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
