//! Demo: mux synthetic video and audio samples into a file

use anyhow::{Context, Result};
use clap::Parser;
use mux_coordinator::capture::{EncodedSample, EncoderProducer, QueuedSource};
use mux_coordinator::{MuxCoordinator, MuxState, MuxerConfig, ProducerKind, TrackFormat};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const VIDEO_FRAMES: i64 = 60;
const AUDIO_CHUNKS: i64 = 100;
/// avcC header for a 1280x720 High profile stream
const AVC_CONFIG: [u8; 7] = [0x01, 0x64, 0x00, 0x1f, 0xff, 0xe1, 0x00];
const RUN_LIMIT: Duration = Duration::from_secs(10);

/// Mux synthetic video and audio samples into a record file
#[derive(Parser, Debug)]
#[command(name = "mux-demo", version)]
struct Args {
    /// Output file, overwritten if present
    output: Option<String>,

    /// Register only the audio producer
    #[arg(long)]
    audio_only: bool,

    /// JSON muxer config; takes precedence over OUTPUT
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    mux_coordinator::init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            MuxerConfig::from_json(&json)?
        }
        None => {
            let output = args.output.clone().unwrap_or_else(|| "demo.mux".to_string());
            let mut config = MuxerConfig::new(output);
            config.overwrite = true;
            config
        }
    };

    let coordinator = Arc::new(MuxCoordinator::create(config).context("failed to open output")?);

    if !args.audio_only {
        let video = QueuedSource::new(
            TrackFormat::video("video/avc", 1280, 720, 30).with_codec_config(AVC_CONFIG.to_vec()),
            (0..VIDEO_FRAMES).map(|i| EncodedSample::new(vec![0u8; 2048], i * 33_333, i % 30 == 0)),
        )
        .paced(Duration::from_millis(33));
        coordinator.register(Box::new(EncoderProducer::new(
            ProducerKind::Video,
            &coordinator,
            Box::new(video),
        )))?;
    }

    let audio = QueuedSource::new(
        TrackFormat::audio("audio/mp4a-latm", 44100, 1),
        (0..AUDIO_CHUNKS).map(|i| EncodedSample::new(vec![0u8; 256], i * 20_000, true)),
    )
    .paced(Duration::from_millis(20));
    coordinator.register(Box::new(EncoderProducer::new(
        ProducerKind::Audio,
        &coordinator,
        Box::new(audio),
    )))?;

    coordinator.prepare()?;
    coordinator.start_recording()?;

    let deadline = Instant::now() + RUN_LIMIT;
    while coordinator.state() != MuxState::Finalized && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    coordinator.stop_recording();

    let snapshot = coordinator.snapshot();
    tracing::info!("Wrote {}", snapshot.output_path);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
