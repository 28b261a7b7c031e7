use capture_replay::StreamId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "capture-replay")]
#[command(author, version, about = "Replay recorded multi-sensor capture sessions")]
pub struct Cli {
    /// Path to playback config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the header information of a recording
    Info {
        /// Recording to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play a recording and report what was delivered
    Play {
        /// Recording to play
        #[arg(required = true)]
        file: PathBuf,

        /// Streams to deliver (defaults to the config, then to every stream)
        #[arg(short, long, value_enum)]
        stream: Vec<StreamId>,

        /// Deliver motion and time-sync samples
        #[arg(long)]
        motion: bool,

        /// Deliver as fast as possible instead of at recorded speed
        #[arg(long)]
        no_realtime: bool,

        /// Start at the first frame captured at or after this timestamp (µs)
        #[arg(long, conflicts_with = "seek_frame")]
        seek_ts: Option<u64>,

        /// Start at this frame index of the first selected stream
        #[arg(long)]
        seek_frame: Option<usize>,

        /// Print every delivered sample
        #[arg(long)]
        print_samples: bool,
    },
}
