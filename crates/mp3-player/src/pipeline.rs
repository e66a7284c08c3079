//! Pipeline orchestration: decode → quantize → write until end of stream.
//!
//! The output sink is opened exactly once, immediately after the first
//! successful decode, using that frame's sample rate and channel count. Any
//! fatal error unwinds through `?`, dropping the sink (device closed), the
//! driver (buffers and source released), and reporting the failing operation.

use std::io::Read;

use anyhow::{Context, Result};

use crate::decode::{DecodeDriver, DecodedFrame, FrameDecoder};
use crate::quantize::quantize_interleaved;
use crate::sink::{PcmSink, SinkController};

/// Counters for one playback run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Interleaved sample frames handed to the device.
    pub frames_written: u64,
    /// Compressed frames decoded.
    pub frames_decoded: u64,
}

/// Run the steady-state loop until end of stream or a fatal error.
///
/// `open_sink` is called once with the first decoded frame's sample rate and
/// channel count; a stream with no decodable frames never opens the device.
pub fn run<D, R, S, F>(
    mut driver: DecodeDriver<D, R>,
    open_sink: F,
    suspend_poll: std::time::Duration,
) -> Result<PlaybackStats>
where
    D: FrameDecoder,
    R: Read,
    S: PcmSink,
    F: FnOnce(u32, u16) -> Result<S>,
{
    let mut stats = PlaybackStats::default();
    let mut frame = DecodedFrame::default();

    if !driver.next_frame(&mut frame)? {
        tracing::warn!("no decodable frames in stream");
        return Ok(stats);
    }
    tracing::info!(
        rate_hz = frame.sample_rate,
        channels = frame.mode.count(),
        "stream format"
    );

    let sink = open_sink(frame.sample_rate, frame.mode.count()).context("open output device")?;
    let mut controller = SinkController::new(sink, suspend_poll);

    let mut pcm = Vec::new();
    loop {
        let frames = quantize_interleaved(&frame, &mut pcm);
        controller.write(&pcm, frames)?;
        stats.frames_decoded += 1;
        stats.frames_written += frames as u64;

        if !driver.next_frame(&mut frame)? {
            break;
        }
    }

    tracing::info!(
        frames = stats.frames_written,
        packets = stats.frames_decoded,
        "end of stream"
    );
    Ok(stats)
}
