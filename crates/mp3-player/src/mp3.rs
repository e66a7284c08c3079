//! nanomp3-backed MP3 frame decoder.
//!
//! Adapts the `nanomp3` crate (a pure-Rust minimp3 translation) to the
//! [`FrameDecoder`] contract. nanomp3 has no internal buffering and reports
//! "no frame" without saying why, so this wrapper classifies the input first:
//! missing sync word at the front is [`DecodeError::SyncLost`] (which lets the
//! driver handle a leading ID3v2 tag), everything else that fails to produce a
//! frame is [`DecodeError::NeedMoreData`].

use crate::decode::{ChannelMode, DecodeError, DecodedFrame, FrameDecoder};

/// MP3 frame decoder backed by nanomp3.
pub struct Mp3Decoder {
    inner: nanomp3::Decoder,
}

impl Mp3Decoder {
    pub fn new() -> Self {
        Self {
            inner: nanomp3::Decoder::new(),
        }
    }
}

impl Default for Mp3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// MPEG audio sync word: 0xFF then at least the top three bits of the next
/// byte set.
fn starts_with_sync(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] & 0xE0 == 0xE0
}

impl FrameDecoder for Mp3Decoder {
    fn decode(&mut self, input: &[u8], frame: &mut DecodedFrame) -> Result<usize, DecodeError> {
        if input.len() < 4 {
            return Err(DecodeError::NeedMoreData);
        }
        if !starts_with_sync(input) {
            return Err(DecodeError::SyncLost);
        }

        // Scratch for one frame: 1152 samples x 2 channels.
        let mut pcm = [0.0f32; nanomp3::MAX_SAMPLES_PER_FRAME];
        let (consumed, info) = self.inner.decode(input, &mut pcm);

        let Some(info) = info else {
            // Sync was present but the frame is truncated at the end of the
            // buffer (or is the zero-padded tail of the stream).
            return Err(DecodeError::NeedMoreData);
        };

        let channels = info.channels.num() as usize;
        frame.sample_rate = info.sample_rate;
        frame.mode = if channels == 1 {
            ChannelMode::Mono
        } else {
            ChannelMode::Stereo
        };

        let len = info.samples_produced / channels.max(1);
        frame.len = len;
        for ch in &mut frame.samples {
            ch.clear();
            ch.resize(len, 0);
        }

        // Deinterleave and widen f32 [-1, 1] to the full i32 range. The cast
        // truncates; the decoder already applied any clipping it wanted.
        for i in 0..len {
            for ch in 0..channels.min(2) {
                let s = pcm[i * channels + ch].clamp(-1.0, 1.0);
                frame.samples[ch][i] = (s * i32::MAX as f32) as i32;
            }
        }

        Ok(consumed)
    }
}
