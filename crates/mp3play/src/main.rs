//! mp3play: a small CLI that streams an MP3 file to the default (or chosen)
//! output device.
//!
//! ## Pipeline
//! 1. **Buffer**: the file is read forward-only into a fixed compressed buffer,
//!    refilled across frame boundaries without losing partially consumed bytes.
//! 2. **Decode**: nanomp3 decodes one frame at a time; a leading ID3v2 tag is
//!    skipped exactly once.
//! 3. **Quantize**: frames are serialized as interleaved S32LE.
//! 4. **Render**: blocking writes feed the CPAL output stream; underrun and
//!    suspend conditions are recovered in place.

mod cli;

use std::fs::File;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mp3_player::config::PlayerConfig;
use mp3_player::decode::DecodeDriver;
use mp3_player::device::{self, CpalSink};
use mp3_player::mp3::Mp3Decoder;
use mp3_player::pipeline;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mp3play=info")),
        )
        .init();

    if args.list_devices {
        return device::list_devices();
    }

    let _ = ctrlc::set_handler(|| std::process::exit(130));

    let path = args.file.context("no input file")?;
    let meta =
        std::fs::metadata(&path).with_context(|| format!("stat {}", path.display()))?;
    if meta.len() == 0 {
        bail!("empty input file: {}", path.display());
    }
    let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;

    let cfg = PlayerConfig {
        buffer_bytes: args.buffer_bytes.max(512),
        volume_percent: args.volume.min(100),
        ..PlayerConfig::default()
    };
    tracing::info!(path = %path.display(), bytes = meta.len(), "playing");

    let driver = DecodeDriver::new(Mp3Decoder::new(), file, cfg.buffer_bytes);
    let device_filter = args.device;
    let open_cfg = cfg.clone();
    let stats = pipeline::run(
        driver,
        move |rate, channels| CpalSink::open(rate, channels, device_filter.as_deref(), &open_cfg),
        cfg.suspend_poll,
    )?;

    tracing::info!(frames = stats.frames_written, "playback finished");
    Ok(())
}
