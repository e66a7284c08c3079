//! Streaming MP3 decode-and-render pipeline.
//!
//! ## Pipeline
//! 1. **Buffer**: a fixed-capacity compressed buffer is refilled in place across
//!    frame boundaries, preserving the unconsumed tail.
//! 2. **Decode**: a [`decode::FrameDecoder`] turns compressed bytes into one
//!    frame of PCM at a time, with a one-shot leading ID3v2 tag skip.
//! 3. **Quantize**: each decoded frame is serialized as interleaved S32LE.
//! 4. **Render**: a [`sink::PcmSink`] accepts blocking writes and the
//!    [`sink::SinkController`] recovers from underrun/suspend failures.
//!
//! The device is opened exactly once, after the first successfully decoded
//! frame fixes the stream's sample rate and channel count.

pub mod buffer;
pub mod config;
pub mod decode;
pub mod device;
pub mod mp3;
pub mod pipeline;
pub mod quantize;
pub mod ring;
pub mod sink;
