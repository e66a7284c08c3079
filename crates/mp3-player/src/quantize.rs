//! PCM quantization.
//!
//! Serializes a decoded frame as interleaved signed 32-bit little-endian PCM,
//! the fixed wire format handed to the output sink. Each sample is the
//! truncating cast of the decoder's internal value; no dithering, rounding, or
//! extra clipping is applied here.

use crate::decode::{ChannelMode, DecodedFrame};

/// Bytes per serialized sample.
pub const BYTES_PER_SAMPLE: usize = 4;

/// Serialize `frame` into `out` as interleaved S32LE (low byte first,
/// left/right alternating for stereo, one sample per position for mono).
///
/// `out` is cleared and overwritten each call so the caller can reuse one
/// allocation for the whole session. Returns the number of interleaved sample
/// frames written; the byte length of `out` is always
/// `frames * channels * BYTES_PER_SAMPLE`.
pub fn quantize_interleaved(frame: &DecodedFrame, out: &mut Vec<u8>) -> usize {
    let channels = frame.mode.count() as usize;
    out.clear();
    out.reserve(frame.len * channels * BYTES_PER_SAMPLE);

    match frame.mode {
        ChannelMode::Mono => {
            for &sample in &frame.samples[0][..frame.len] {
                out.extend_from_slice(&sample.to_le_bytes());
            }
        }
        ChannelMode::Stereo => {
            for i in 0..frame.len {
                out.extend_from_slice(&frame.samples[0][i].to_le_bytes());
                out.extend_from_slice(&frame.samples[1][i].to_le_bytes());
            }
        }
    }

    frame.len
}
