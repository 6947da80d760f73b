use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxop::integration::OrchestratorEvent;
use voxop::{Orchestrator, OrchestratorConfig};

/// One line of stdin
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum DemoCommand {
    Begin {
        name: String,
        #[serde(rename = "expectedDurationMs")]
        expected_duration_ms: u64,
    },
    Result {
        result: serde_json::Value,
    },
    Transcription {
        text: String,
    },
    Cancel,
    Status,
}

/// Voice feedback orchestrator driven by JSON commands on stdin
#[derive(Parser, Debug)]
#[command(name = "voxop", version, about)]
struct Args {
    /// TOML configuration file
    config: Option<PathBuf>,

    /// Write every completed clip to this directory as WAV
    #[arg(long, value_name = "DIR")]
    wav_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxop=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::default(),
    };

    if let Some(dir) = &args.wav_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    info!("Starting voxop");

    let (orchestrator, handle) = Orchestrator::new(config)?;
    let events = handle.events().all.subscribe();
    let mut threads = orchestrator.start()?;

    let wav_dir = args.wav_dir.clone();
    threads.push(thread::spawn(move || {
        for event in events.iter() {
            match &event {
                OrchestratorEvent::AudioDelta(chunk) => {
                    debug!("audioDelta {} #{}", chunk.request_id, chunk.index);
                }
                OrchestratorEvent::AudioComplete(audio) => {
                    info!(
                        "audioComplete {} ({} chunks, {}ms)",
                        audio.request_id,
                        audio.chunk_count,
                        audio.duration_ms()
                    );
                    if let Some(dir) = &wav_dir {
                        let path = dir.join(format!("{}.wav", audio.request_id));
                        match audio.to_wav_bytes() {
                            Ok(bytes) => {
                                if let Err(e) = std::fs::write(&path, bytes) {
                                    warn!("Failed to write {}: {}", path.display(), e);
                                }
                            }
                            Err(e) => warn!("Failed to encode WAV: {}", e),
                        }
                    }
                }
                OrchestratorEvent::Progress(update) => {
                    info!("progressUpdate [{}ms] {}", update.elapsed_ms, update.message);
                }
                OrchestratorEvent::Cancelled(cancelled) => {
                    info!("operationCancelled {}", cancelled.operation);
                }
                OrchestratorEvent::Transcription(text) => info!("transcription {}", text),
                OrchestratorEvent::Response(response) => info!("response {}", response.text),
                OrchestratorEvent::SpeechFailed(failure) => {
                    warn!("speechFailed: {}", failure.error);
                }
                OrchestratorEvent::Shutdown => break,
            }
        }
    }));

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let command: DemoCommand = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Skipping unreadable command: {}", e);
                continue;
            }
        };

        match command {
            DemoCommand::Begin {
                name,
                expected_duration_ms,
            } => handle.begin_long_operation(name, expected_duration_ms)?,
            DemoCommand::Result { result } => handle.handle_result_json(&result.to_string())?,
            DemoCommand::Transcription { text } => handle.handle_transcription(text)?,
            DemoCommand::Cancel => handle.cancel_operation()?,
            DemoCommand::Status => {
                let status = handle.status();
                println!("{}", serde_json::to_string(&status)?);
            }
        }
    }

    info!("Input closed, shutting down");
    handle.shutdown()?;
    for t in threads {
        if t.join().is_err() {
            warn!("A worker thread panicked");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_args_config_and_wav_dir() {
        let args = Args::try_parse_from(["voxop", "voxop.toml", "--wav-dir", "out"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("voxop.toml")));
        assert_eq!(args.wav_dir, Some(PathBuf::from("out")));

        let args = Args::try_parse_from(["voxop"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.wav_dir.is_none());
    }

    #[test]
    fn test_args_reject_bad_flags() {
        assert!(Args::try_parse_from(["voxop", "--wav-dir"]).is_err());
        assert!(Args::try_parse_from(["voxop", "--wav-dir", "--foo"]).is_err());
        assert!(Args::try_parse_from(["voxop", "--verbose"]).is_err());
    }
}
