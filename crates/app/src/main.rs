use clap::Parser;
use polyvox_app::config::{AppConfig, Cli};
use polyvox_app::runtime;
use polyvox_foundation::ShutdownHandler;
use polyvox_tts::{PriorityTier, SynthesisRequest, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

fn init_logging() -> anyhow::Result<()> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "polyvox.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(guard);
    Ok(())
}

/// Parse one front-end line: `user: text`, with a trailing `!` on the
/// user marking administrator priority (e.g. `alice!: hello`).
fn parse_line(line: &str) -> Option<(UserId, PriorityTier, String)> {
    let (user_part, text) = line.split_once(':')?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let user_part = user_part.trim();
    let (name, tier) = match user_part.strip_suffix('!') {
        Some(name) => (name, PriorityTier::Administrator),
        None => (user_part, PriorityTier::Normal),
    };
    if name.is_empty() {
        return None;
    }
    Some((UserId::new(name), tier, text.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging()?;
    tracing::info!("Starting polyvox");

    let config = cli.apply(AppConfig::load(cli.config.as_deref())?);
    let shutdown = ShutdownHandler::new().install().await;
    let handle = runtime::start(&config, cli.elevenlabs_api_key.clone())?;

    let orchestrator = Arc::clone(&handle.orchestrator);
    let default_engine = config.default_engine;
    let output_dir = config.output_dir.clone();

    // Line-oriented local front end standing in for the chat platform:
    // one line per utterance, profile commands handled upstream.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stats_interval =
        tokio::time::interval(Duration::from_secs(config.status_interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = stats_interval.tick() => {
                tracing::info!("{}", handle.status());
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else {
                    tracing::info!("Input closed");
                    break;
                };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if line == ":status" {
                    tracing::info!("{}", handle.status());
                    continue;
                }
                if line == ":clear" {
                    let dropped = orchestrator.queue().clear();
                    tracing::info!("Cleared {} queued requests", dropped);
                    continue;
                }
                if line == ":quit" {
                    shutdown.request_shutdown();
                    continue;
                }

                let Some((user, tier, text)) = parse_line(&line) else {
                    tracing::warn!("Unparseable line; expected `user: text`");
                    continue;
                };

                let request = SynthesisRequest::new(user.clone(), text, default_engine)
                    .with_priority(tier);
                let orchestrator = Arc::clone(&orchestrator);
                let output_dir = output_dir.clone();
                // Awaiting in a task keeps the front end responsive
                // while a synthesis is in flight.
                tokio::spawn(async move {
                    match orchestrator.handle(request).await {
                        Ok(artifact) => {
                            let name = format!(
                                "{:.16}.{}",
                                artifact.fingerprint.to_hex(),
                                artifact.audio.format.extension()
                            );
                            let path = output_dir.join(name);
                            if let Err(e) = tokio::fs::write(&path, &artifact.audio.bytes).await {
                                tracing::error!("Failed to write {}: {}", path.display(), e);
                            } else {
                                tracing::info!(
                                    "{} -> {} ({} bytes)",
                                    user,
                                    path.display(),
                                    artifact.audio.bytes.len()
                                );
                            }
                        }
                        Err(e) => tracing::warn!("Request for {} failed: {}", user, e),
                    }
                });
            }
        }
    }

    handle.shutdown().await?;
    Ok(())
}
