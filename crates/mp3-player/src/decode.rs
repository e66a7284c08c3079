//! Frame decode driver.
//!
//! [`FrameDecoder`] is the narrow contract to the external bitstream decoder:
//! decode one frame from the front of a byte slice and report how many bytes
//! were consumed, or classify the failure as need-more-data / sync-lost /
//! fatal. [`DecodeDriver`] drives a decoder across the compressed buffer,
//! handling the one-time leading ID3v2 tag skip and the refill-and-retry
//! cycle at frame boundaries.

use std::io::Read;

use anyhow::{Context, Result, bail};
use thiserror::Error;

use crate::buffer::CompressedBuffer;

/// Channel layout of a decoded frame. Anything that is not mono renders as
/// two channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelMode {
    #[default]
    Mono,
    Stereo,
}

impl ChannelMode {
    /// Number of output channels for this mode.
    pub fn count(self) -> u16 {
        match self {
            ChannelMode::Mono => 1,
            ChannelMode::Stereo => 2,
        }
    }
}

/// One frame of decoded PCM audio.
///
/// Reused across iterations: the next decode call overwrites it in place.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    pub sample_rate: u32,
    pub mode: ChannelMode,
    /// Per-channel sample arrays; `samples[1]` is meaningful only in stereo.
    pub samples: [Vec<i32>; 2],
    /// Samples per channel.
    pub len: usize,
}

/// Failure classification reported by a [`FrameDecoder`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The input ended mid-frame; refill the buffer and retry.
    #[error("bitstream exhausted mid-frame")]
    NeedMoreData,
    /// No frame sync word at the read position.
    #[error("lost synchronization with the bitstream")]
    SyncLost,
    /// Any other decoder failure; the stream cannot continue.
    #[error("unrecoverable stream error: {0}")]
    Fatal(String),
}

/// Narrow contract to the external frame decoder.
pub trait FrameDecoder {
    /// Decode the next frame from the front of `input` into `frame`.
    ///
    /// On success returns the number of input bytes consumed, which may exceed
    /// the frame payload if the decoder skipped junk to find sync.
    fn decode(&mut self, input: &[u8], frame: &mut DecodedFrame) -> Result<usize, DecodeError>;
}

/// ID3v2 header: "ID3", version (2 bytes), flags (1 byte), syncsafe size (4 bytes).
const ID3V2_HEADER_LEN: usize = 10;

/// Total byte length of a leading ID3v2 tag, if `data` starts with one.
///
/// The declared size is 28-bit syncsafe (high bit of each size byte clear) and
/// excludes the 10-byte header.
fn id3v2_tag_len(data: &[u8]) -> Option<usize> {
    if data.len() < ID3V2_HEADER_LEN || &data[..3] != b"ID3" {
        return None;
    }
    if (data[6] | data[7] | data[8] | data[9]) & 0x80 != 0 {
        return None;
    }
    let n = (data[6] as usize) << 21
        | (data[7] as usize) << 14
        | (data[8] as usize) << 7
        | (data[9] as usize);
    Some(n + ID3V2_HEADER_LEN)
}

/// Drives a [`FrameDecoder`] across a [`CompressedBuffer`], refilling from
/// `source` whenever a frame is truncated at the buffer boundary.
pub struct DecodeDriver<D, R> {
    decoder: D,
    source: R,
    buf: CompressedBuffer,
    /// Bytes of `buf` already consumed by the decoder.
    pos: usize,
    /// Remaining bytes of a metadata skip that spans refills.
    skip_pending: usize,
    /// Set once the first frame decodes; a later sync loss is fatal.
    synced: bool,
    /// The one-time leading tag skip has been spent.
    tag_skipped: bool,
}

impl<D: FrameDecoder, R: Read> DecodeDriver<D, R> {
    pub fn new(decoder: D, source: R, buffer_bytes: usize) -> Self {
        Self {
            decoder,
            source,
            buf: CompressedBuffer::new(buffer_bytes),
            pos: 0,
            skip_pending: 0,
            synced: false,
            tag_skipped: false,
        }
    }

    /// Decode the next frame into `frame`.
    ///
    /// Returns `Ok(true)` on success, `Ok(false)` at end of stream (the source
    /// yielded no further bytes and no frame could be decoded), and `Err` on
    /// source I/O errors or unrecoverable decoder errors.
    pub fn next_frame(&mut self, frame: &mut DecodedFrame) -> Result<bool> {
        loop {
            if self.skip_pending > 0 {
                let step = self.skip_pending.min(self.buf.len() - self.pos);
                self.pos += step;
                self.skip_pending -= step;
            }

            if self.skip_pending == 0 && self.pos < self.buf.len() {
                match self.decoder.decode(&self.buf.valid()[self.pos..], frame) {
                    Ok(consumed) => {
                        self.pos += consumed;
                        self.synced = true;
                        return Ok(true);
                    }
                    Err(DecodeError::NeedMoreData) => {}
                    Err(DecodeError::SyncLost) if !self.synced && !self.tag_skipped => {
                        let Some(skip) = id3v2_tag_len(&self.buf.valid()[self.pos..]) else {
                            bail!("lost synchronization at start of stream (no ID3v2 tag)");
                        };
                        tracing::info!(bytes = skip, "skipping leading ID3v2 tag");
                        self.skip_pending = skip;
                        self.tag_skipped = true;
                        continue;
                    }
                    Err(e @ DecodeError::SyncLost) | Err(e @ DecodeError::Fatal(_)) => {
                        return Err(e).context("decode frame");
                    }
                }

                if self.pos == 0 && self.buf.is_full() {
                    bail!(
                        "compressed frame larger than the {} byte buffer",
                        self.buf.capacity()
                    );
                }
            }

            let fresh = self
                .buf
                .refill(self.pos, &mut self.source)
                .context("read compressed stream")?;
            self.pos = 0;
            if fresh == 0 {
                return Ok(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Consumes exactly `frame_bytes` bytes per frame and echoes them as mono
    /// samples, so tests can check byte-exact continuity across refills.
    struct ChunkDecoder {
        frame_bytes: usize,
    }

    impl FrameDecoder for ChunkDecoder {
        fn decode(&mut self, input: &[u8], frame: &mut DecodedFrame) -> Result<usize, DecodeError> {
            if input.len() < self.frame_bytes {
                return Err(DecodeError::NeedMoreData);
            }
            frame.sample_rate = 44_100;
            frame.mode = ChannelMode::Mono;
            frame.len = self.frame_bytes;
            frame.samples[0] = input[..self.frame_bytes].iter().map(|&b| b as i32).collect();
            Ok(self.frame_bytes)
        }
    }

    /// Like [`ChunkDecoder`], but reports sync loss unless the input starts
    /// with the marker byte `0xFF`.
    struct SyncDecoder {
        frame_bytes: usize,
    }

    impl FrameDecoder for SyncDecoder {
        fn decode(&mut self, input: &[u8], frame: &mut DecodedFrame) -> Result<usize, DecodeError> {
            if input.is_empty() {
                return Err(DecodeError::NeedMoreData);
            }
            if input[0] != 0xFF {
                return Err(DecodeError::SyncLost);
            }
            ChunkDecoder {
                frame_bytes: self.frame_bytes,
            }
            .decode(input, frame)
        }
    }

    fn drain<D: FrameDecoder, R: Read>(driver: &mut DecodeDriver<D, R>) -> Vec<i32> {
        let mut frame = DecodedFrame::default();
        let mut out = Vec::new();
        while driver.next_frame(&mut frame).unwrap() {
            out.extend_from_slice(&frame.samples[0][..frame.len]);
        }
        out
    }

    fn id3_tag(content_len: usize) -> Vec<u8> {
        let mut tag = vec![b'I', b'D', b'3', 4, 0, 0];
        tag.push(((content_len >> 21) & 0x7F) as u8);
        tag.push(((content_len >> 14) & 0x7F) as u8);
        tag.push(((content_len >> 7) & 0x7F) as u8);
        tag.push((content_len & 0x7F) as u8);
        tag.extend(std::iter::repeat_n(0xAAu8, content_len));
        tag
    }

    #[test]
    fn frames_are_continuous_across_refill_boundaries() {
        // 7 does not divide the 32-byte buffer, so every refill carries a tail.
        let stream: Vec<u8> = (0..=255u8).cycle().take(7 * 40).collect();
        let mut driver = DecodeDriver::new(
            ChunkDecoder { frame_bytes: 7 },
            Cursor::new(stream.clone()),
            32,
        );
        let decoded = drain(&mut driver);
        let expect: Vec<i32> = stream.iter().map(|&b| b as i32).collect();
        assert_eq!(decoded, expect);
    }

    #[test]
    fn trailing_partial_frame_ends_the_stream_cleanly() {
        let stream: Vec<u8> = vec![1u8; 7 * 3 + 4];
        let mut driver = DecodeDriver::new(ChunkDecoder { frame_bytes: 7 }, Cursor::new(stream), 32);
        let decoded = drain(&mut driver);
        assert_eq!(decoded.len(), 7 * 3);
    }

    #[test]
    fn empty_source_is_end_of_stream_not_an_error() {
        let mut driver = DecodeDriver::new(
            ChunkDecoder { frame_bytes: 7 },
            Cursor::new(Vec::new()),
            32,
        );
        let mut frame = DecodedFrame::default();
        assert!(!driver.next_frame(&mut frame).unwrap());
    }

    #[test]
    fn leading_id3_tag_is_skipped_exactly() {
        let mut stream = id3_tag(30);
        stream.push(0xFF);
        stream.extend_from_slice(&[9, 9, 9, 9, 9, 9]); // rest of first frame
        let mut driver = DecodeDriver::new(SyncDecoder { frame_bytes: 7 }, Cursor::new(stream), 64);
        let decoded = drain(&mut driver);
        // First decoded byte is the first byte after the 30+10 byte tag.
        assert_eq!(decoded, vec![0xFF, 9, 9, 9, 9, 9, 9]);
    }

    #[test]
    fn id3_tag_longer_than_the_buffer_is_skipped_across_refills() {
        let mut stream = id3_tag(100);
        stream.push(0xFF);
        stream.extend_from_slice(&[5, 5, 5, 5, 5, 5]);
        let mut driver = DecodeDriver::new(SyncDecoder { frame_bytes: 7 }, Cursor::new(stream), 32);
        let decoded = drain(&mut driver);
        assert_eq!(decoded, vec![0xFF, 5, 5, 5, 5, 5, 5]);
    }

    #[test]
    fn sync_loss_without_id3_tag_is_fatal() {
        let stream = vec![0u8; 64];
        let mut driver = DecodeDriver::new(SyncDecoder { frame_bytes: 7 }, Cursor::new(stream), 32);
        let mut frame = DecodedFrame::default();
        assert!(driver.next_frame(&mut frame).is_err());
    }

    #[test]
    fn second_sync_loss_is_fatal() {
        let mut stream = vec![0xFFu8, 1, 2, 3, 4, 5, 6];
        stream.extend_from_slice(&[0u8; 32]); // garbage after the first frame
        let mut driver = DecodeDriver::new(SyncDecoder { frame_bytes: 7 }, Cursor::new(stream), 32);
        let mut frame = DecodedFrame::default();
        assert!(driver.next_frame(&mut frame).unwrap());
        assert!(driver.next_frame(&mut frame).is_err());
    }

    #[test]
    fn fatal_decoder_error_propagates() {
        struct Broken;
        impl FrameDecoder for Broken {
            fn decode(
                &mut self,
                _input: &[u8],
                _frame: &mut DecodedFrame,
            ) -> Result<usize, DecodeError> {
                Err(DecodeError::Fatal("bad bit reservoir".into()))
            }
        }
        let mut driver = DecodeDriver::new(Broken, Cursor::new(vec![0u8; 16]), 32);
        let mut frame = DecodedFrame::default();
        assert!(driver.next_frame(&mut frame).is_err());
    }

    #[test]
    fn oversized_frame_is_fatal_instead_of_looping() {
        let mut driver = DecodeDriver::new(
            ChunkDecoder { frame_bytes: 64 },
            Cursor::new(vec![0u8; 256]),
            32,
        );
        let mut frame = DecodedFrame::default();
        assert!(driver.next_frame(&mut frame).is_err());
    }

    #[test]
    fn id3v2_tag_len_rejects_non_syncsafe_sizes() {
        assert!(id3v2_tag_len(b"ID3\x04\x00\x00\x00\x00\x00\x80").is_none());
        assert!(id3v2_tag_len(b"TAG\x04\x00\x00\x00\x00\x00\x10").is_none());
        assert_eq!(id3v2_tag_len(b"ID3\x04\x00\x00\x00\x00\x02\x01"), Some(0x101 + 10));
    }
}
