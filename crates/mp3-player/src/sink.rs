//! Output sink contract and write-failure recovery.
//!
//! [`PcmSink`] is the narrow contract to the output device: blocking writes of
//! interleaved S32LE frames, plus the two recovery operations the device
//! exposes. [`SinkController`] classifies write failures and runs the
//! recovery state machine:
//!
//! - **underrun**: reset the device to a prepared state; the lost audio is not
//!   replayed and playback continues with the next frame.
//! - **suspended**: poll for resume readiness until the device comes back or
//!   reports a harder failure, then fall back to a prepared-state reset.
//! - anything else is fatal and propagates to the orchestrator.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;

/// Write failure classification reported by a [`PcmSink`].
#[derive(Debug, Error)]
pub enum SinkError {
    /// The device ran out of buffered audio because the pipeline fell behind.
    #[error("output device underrun")]
    Underrun,
    /// The device was suspended by the system (e.g. power management).
    #[error("output device suspended")]
    Suspended,
    /// Any other device failure; playback cannot continue.
    #[error("output device error: {0}")]
    Fatal(String),
}

/// Narrow contract to the opened output device.
pub trait PcmSink {
    /// Blocking write of exactly `frames` interleaved S32LE sample frames.
    ///
    /// `pcm.len()` must equal `frames * channels * 4`.
    fn write(&mut self, pcm: &[u8], frames: usize) -> Result<(), SinkError>;

    /// Reset the device to a prepared, ready-to-write state.
    fn prepare(&mut self) -> Result<(), SinkError>;

    /// Poll a suspended device once. `Ok(true)` means it resumed, `Ok(false)`
    /// means it is still suspended, `Err` is a harder failure.
    fn try_resume(&mut self) -> Result<bool, SinkError>;
}

/// Owns the opened sink for the lifetime of one playback run and applies the
/// recovery policy to every write.
pub struct SinkController<S> {
    sink: S,
    suspend_poll: Duration,
}

impl<S: PcmSink> SinkController<S> {
    pub fn new(sink: S, suspend_poll: Duration) -> Self {
        Self { sink, suspend_poll }
    }

    /// Write one quantized frame, recovering from underrun/suspend in place.
    ///
    /// A recovered failure drops the frame (it is not replayed) and returns
    /// `Ok`; a failed recovery or any other device error is fatal.
    pub fn write(&mut self, pcm: &[u8], frames: usize) -> Result<()> {
        match self.sink.write(pcm, frames) {
            Ok(()) => Ok(()),
            Err(SinkError::Underrun) => {
                tracing::warn!("device underrun; resetting to prepared state");
                self.sink.prepare().context("recover from underrun")?;
                Ok(())
            }
            Err(SinkError::Suspended) => self.recover_from_suspend(),
            Err(other) => Err(other).context("device write"),
        }
    }

    /// Poll `try_resume` until the device comes back. A harder failure while
    /// polling falls back to a prepared-state reset; if that also fails the
    /// suspend is unrecoverable.
    fn recover_from_suspend(&mut self) -> Result<()> {
        tracing::warn!("device suspended; waiting for resume");
        loop {
            match self.sink.try_resume() {
                Ok(true) => {
                    tracing::info!("device resumed");
                    return Ok(());
                }
                Ok(false) => thread::sleep(self.suspend_poll),
                Err(e) => {
                    tracing::warn!(error = %e, "resume failed; resetting to prepared state");
                    self.sink.prepare().context("recover from suspend")?;
                    return Ok(());
                }
            }
        }
    }
}
