//! Bounded sample queue between the blocking writer and the device callback.
//!
//! The writer side pushes interleaved `i32` samples and blocks while the
//! queue is full; the real-time callback drains without blocking and fills
//! silence when the queue runs dry. Running dry after playback has started
//! sets a latched underrun flag that the device sink reports on its next
//! write.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Thread-safe bounded queue of interleaved `i32` samples.
pub struct SampleRing {
    inner: Mutex<RingInner>,
    cv: Condvar,
    capacity: usize,
}

struct RingInner {
    queue: VecDeque<i32>,
    closed: bool,
    /// Any sample has ever been pushed; silence before that is not an underrun.
    started: bool,
    /// Latched when the callback ran dry mid-playback.
    underrun: bool,
}

impl SampleRing {
    /// Create a ring holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                queue: VecDeque::new(),
                closed: false,
                started: false,
                underrun: false,
            }),
            cv: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Push interleaved samples, blocking while the ring is full.
    ///
    /// Returns `false` if the ring was closed before all samples were
    /// accepted; remaining samples are dropped.
    pub fn push_blocking(&self, samples: &[i32]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();
            while g.queue.len() >= self.capacity && !g.closed {
                g = self.cv.wait(g).unwrap();
            }
            if g.closed {
                return false;
            }
            g.started = true;
            while offset < samples.len() && g.queue.len() < self.capacity {
                g.queue.push_back(samples[offset]);
                offset += 1;
            }
            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Fill `out` from the queue without blocking, zeroing any shortfall.
    ///
    /// Intended for the real-time callback. A shortfall after playback has
    /// started (and before close) latches the underrun flag.
    pub fn pop_into(&self, out: &mut [i32]) -> usize {
        let mut g = self.inner.lock().unwrap();
        let take = g.queue.len().min(out.len());
        for slot in &mut out[..take] {
            *slot = g.queue.pop_front().unwrap_or(0);
        }
        out[take..].fill(0);
        if take < out.len() && g.started && !g.closed {
            g.underrun = true;
        }
        drop(g);
        self.cv.notify_all();
        take
    }

    /// Read and clear the latched underrun flag.
    pub fn take_underrun(&self) -> bool {
        let mut g = self.inner.lock().unwrap();
        std::mem::take(&mut g.underrun)
    }

    /// Number of buffered samples (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// True if no samples are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the ring and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Block until the queue drains or `timeout` elapses.
    ///
    /// Used at teardown so the tail of the stream is not cut off.
    pub fn wait_empty(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut g = self.inner.lock().unwrap();
        while !g.queue.is_empty() {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (ng, _) = self.cv.wait_timeout(g, deadline - now).unwrap();
            g = ng;
        }
        true
    }
}
