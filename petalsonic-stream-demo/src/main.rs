mod session;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "petalsonic-stream-demo",
    about = "Streams a looping mono source around the listener"
)]
pub struct Args {
    /// Raw little-endian mono f32 PCM file. A generated tone is used when omitted.
    pub source: Option<PathBuf>,

    /// Sample rate of the source in Hz
    #[arg(long, default_value_t = 44100)]
    pub sample_rate: u32,

    /// Samples per spatialized buffer
    #[arg(long, default_value_t = 4096)]
    pub frame_size: usize,

    /// Buffers kept queued on the device
    #[arg(long, default_value_t = 4)]
    pub queue_depth: usize,

    /// How long to run, in seconds
    #[arg(long, default_value_t = 10.0)]
    pub seconds: f32,

    /// Orbit radius of the emitter around the listener
    #[arg(long, default_value_t = 2.0)]
    pub radius: f32,

    /// Custom HRTF SOFA file
    #[arg(long)]
    pub hrtf: Option<String>,

    /// Simulate a device instead of opening the default output
    #[arg(long)]
    pub offline: bool,

    /// Debug-level logging
    #[arg(long, short)]
    pub verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    session::run(&args)
}
