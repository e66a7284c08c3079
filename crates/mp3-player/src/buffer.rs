//! Bitstream buffer management.
//!
//! [`CompressedBuffer`] owns a fixed-capacity byte buffer holding the
//! still-undecoded tail of the compressed stream. When a decode attempt runs
//! out of data mid-frame, [`CompressedBuffer::refill`] compacts the unconsumed
//! tail to the front and appends fresh bytes from the source, so no byte is
//! decoded twice or dropped at a refill boundary.

use std::io::{self, Read};

/// Fixed-capacity buffer for the undecoded tail of a compressed stream.
///
/// Bytes in `[0, len)` are valid compressed data; bytes beyond `len` are kept
/// zeroed after a refill so the decoder never inspects stale data past the
/// freshly read region.
pub struct CompressedBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl CompressedBuffer {
    /// Allocate a buffer of `capacity` bytes. Allocated once at pipeline start
    /// and refilled in place, never reallocated.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// The currently valid compressed bytes.
    pub fn valid(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no valid bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if the valid region spans the whole backing storage.
    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// Total backing capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Preserve the unconsumed tail `[consumed, len)` by moving it to offset 0,
    /// then append fresh bytes from `source` up to capacity.
    ///
    /// The unfilled remainder of the request is zero-padded; the decoder may
    /// rely on trailing zeros to detect a safely truncated final frame.
    ///
    /// Returns the number of fresh bytes read. Zero means the source is
    /// exhausted. A read error is fatal and propagated to the caller.
    pub fn refill<R: Read>(&mut self, consumed: usize, source: &mut R) -> io::Result<usize> {
        debug_assert!(consumed <= self.len);
        let tail = self.len - consumed;
        self.data.copy_within(consumed..self.len, 0);

        let mut filled = 0usize;
        while tail + filled < self.data.len() {
            let n = source.read(&mut self.data[tail + filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        self.data[tail + filled..].fill(0);
        self.len = tail + filled;
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A reader that hands out at most `per_call` bytes per `read()`.
    struct Dribble {
        inner: Cursor<Vec<u8>>,
        per_call: usize,
    }

    impl Read for Dribble {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let cap = buf.len().min(self.per_call);
            self.inner.read(&mut buf[..cap])
        }
    }

    #[test]
    fn refill_fills_empty_buffer() {
        let mut buf = CompressedBuffer::new(8);
        let mut src = Cursor::new(vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let n = buf.refill(0, &mut src).unwrap();
        assert_eq!(n, 8);
        assert_eq!(buf.valid(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(buf.is_full());
    }

    #[test]
    fn refill_preserves_unconsumed_tail() {
        let mut buf = CompressedBuffer::new(8);
        let mut src = Cursor::new(vec![10, 11, 12, 13, 14, 15, 16, 17, 20, 21, 22]);
        buf.refill(0, &mut src).unwrap();

        // Decoder consumed 6 of 8 bytes; [16, 17] must survive at offset 0.
        let n = buf.refill(6, &mut src).unwrap();
        assert_eq!(n, 3);
        assert_eq!(buf.valid(), &[16, 17, 20, 21, 22]);
    }

    #[test]
    fn short_read_zero_pads_the_remainder() {
        let mut buf = CompressedBuffer::new(8);
        let mut src = Cursor::new(vec![1, 2, 3]);
        let n = buf.refill(0, &mut src).unwrap();
        assert_eq!(n, 3);
        assert_eq!(buf.len(), 3);
        // Stale bytes beyond the valid region are cleared.
        assert!(buf.data[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn refill_loops_over_partial_reads() {
        let mut src = Dribble {
            inner: Cursor::new((0u8..16).collect()),
            per_call: 3,
        };
        let mut buf = CompressedBuffer::new(10);
        let n = buf.refill(0, &mut src).unwrap();
        assert_eq!(n, 10);
        assert_eq!(buf.valid(), &(0u8..10).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn exhausted_source_reads_zero() {
        let mut buf = CompressedBuffer::new(8);
        let mut src = Cursor::new(vec![1, 2]);
        buf.refill(0, &mut src).unwrap();
        let n = buf.refill(2, &mut src).unwrap();
        assert_eq!(n, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn read_error_is_propagated() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }
        let mut buf = CompressedBuffer::new(8);
        assert!(buf.refill(0, &mut Failing).is_err());
    }
}
