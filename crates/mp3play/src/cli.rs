use std::path::PathBuf;

use clap::Parser;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "mp3play", version = VERSION)]
pub struct Args {
    /// Path to the MP3 file to play
    #[arg(required_unless_present = "list_devices")]
    pub file: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Master volume percent (0..=100)
    #[arg(long, default_value_t = 85)]
    pub volume: u8,

    /// Compressed read buffer size in bytes
    #[arg(long, default_value_t = 16 * 1024)]
    pub buffer_bytes: usize,
}
