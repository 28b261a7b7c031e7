//! capture-replay - Main Entry Point
//!
//! Headless player for recorded capture sessions: dumps recording headers and
//! plays recordings through the engine, reporting delivery statistics.

mod cli;

use anyhow::{Context, Result};
use capture_replay::{
    playback::{eof_channel, sample_channel},
    PlaybackConfig, PlaybackEngine, Sample,
};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn load_config(path: Option<&Path>) -> Result<PlaybackConfig> {
    match path {
        Some(path) => PlaybackConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        None => Ok(PlaybackConfig::load_or_default()),
    }
}

fn show_info(file: &Path, config: PlaybackConfig, json: bool) -> Result<()> {
    let mut engine = PlaybackEngine::init_with_config(file, config)?;
    let info = engine.query_file_info();
    let streams = engine.query_streams();

    if json {
        let mut counts = serde_json::Map::new();
        for stream in &streams {
            let frames = engine.query_number_of_frames(stream.stream)?;
            counts.insert(stream.stream.to_string(), frames.into());
        }
        let output = serde_json::json!({
            "file": info,
            "streams": streams,
            "frames": counts,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Recording:    {}", file.display());
    println!("Format:       {:?} v{}", info.format, info.version);
    println!("Capture mode: {:?}", info.capture_mode);
    println!("SDK:          {}", info.sdk_version);
    println!("Library:      {}", info.librealsense_version);
    println!("Streams:");
    for stream in &streams {
        let frames = engine.query_number_of_frames(stream.stream)?;
        println!(
            "  {:<10} {}x{} {:?} @ {} fps, {} compression, {} frames",
            stream.stream.to_string(),
            stream.profile.width,
            stream.profile.height,
            stream.profile.format,
            stream.profile.frame_rate,
            stream.compression,
            frames
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn play(
    file: &Path,
    mut config: PlaybackConfig,
    streams: Vec<capture_replay::StreamId>,
    motion: bool,
    no_realtime: bool,
    seek_ts: Option<u64>,
    seek_frame: Option<usize>,
    print_samples: bool,
) -> Result<()> {
    if !streams.is_empty() {
        config.streams = streams;
    }
    config.motion_enabled |= motion;
    if no_realtime {
        config.realtime = false;
    }

    let mut engine = PlaybackEngine::init_with_config(file, config.clone())?;
    if config.streams.is_empty() {
        for info in engine.query_streams() {
            engine.enable_stream(info.stream, true)?;
        }
    }

    let (on_sample, samples) = sample_channel();
    let (on_eof, eof) = eof_channel();
    engine.set_sample_callback(on_sample)?;
    engine.set_eof_callback(on_eof)?;

    if let Some(ts) = seek_ts {
        let frames = engine.set_frame_by_timestamp(ts)?;
        tracing::info!("Seeked to {}us, {} frames selected", ts, frames.len());
    } else if let Some(index) = seek_frame {
        let stream = engine
            .query_streams()
            .into_iter()
            .map(|s| s.stream)
            .find(|s| engine.is_stream_enabled(*s))
            .context("No stream enabled to seek in")?;
        let frames = engine.set_frame_by_index(index, stream)?;
        tracing::info!("Seeked to {} frame {}, {} frames selected", stream, index, frames.len());
    }

    engine.resume()?;
    loop {
        crossbeam_channel::select! {
            recv(samples) -> sample => {
                if let (Ok(sample), true) = (sample, print_samples) {
                    print_sample(&sample);
                }
            }
            recv(eof) -> _ => break,
            default(Duration::from_millis(100)) => {
                // the reader stopped without reaching the end, pause reports why
                if !engine.is_running() {
                    break;
                }
            }
        }
    }
    engine.pause()?;

    for sample in samples.try_iter() {
        if print_samples {
            print_sample(&sample);
        }
    }

    let stats = engine.query_stats();
    println!(
        "Delivered {} frames, {} motion, {} time-sync samples in {:.3}s",
        stats.delivered_frames,
        stats.delivered_motion,
        stats.delivered_time_sync,
        engine.query_run_time().as_secs_f64()
    );
    println!(
        "Skipped {} frames, {} frame drops recorded",
        stats.skipped_frames, stats.total_frame_drops
    );
    Ok(())
}

fn print_sample(sample: &Sample) {
    match sample {
        Sample::Frame(frame) => println!(
            "{:>12}us {:<10} frame {:>6} {} bytes",
            frame.capture_time(),
            frame.stream().to_string(),
            frame.frame_number(),
            frame.data.len()
        ),
        Sample::Motion(motion) => println!(
            "{:>12}us motion     {:?} {:?}",
            motion.capture_time, motion.motion_type, motion.data
        ),
        Sample::TimeSync(sync) => println!(
            "{:>12}us time-sync  frame {}",
            sync.capture_time, sync.frame_number
        ),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "debug,capture_replay=trace"
    } else {
        "info,capture_replay=debug"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { file, json } => show_info(&file, config, json),
        Commands::Play {
            file,
            stream,
            motion,
            no_realtime,
            seek_ts,
            seek_frame,
            print_samples,
        } => play(
            &file,
            config,
            stream,
            motion,
            no_realtime,
            seek_ts,
            seek_frame,
            print_samples,
        ),
    }
}
