use std::time::Duration;

/// Tuning parameters shared by the buffer/decode/render stages.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Compressed buffer capacity in bytes.
    pub buffer_bytes: usize,
    /// How often a suspended device is polled for resume readiness.
    pub suspend_poll: Duration,
    /// Target duration of PCM buffered between the writer and the device callback.
    pub ring_seconds: f32,
    /// Master volume percent (0..=100) applied in the device callback.
    pub volume_percent: u8,
}

impl Default for PlayerConfig {
    /// Defaults matching a plain single-file player session.
    fn default() -> Self {
        Self {
            buffer_bytes: 16 * 1024,
            suspend_poll: Duration::from_secs(1),
            ring_seconds: 0.5,
            volume_percent: 85,
        }
    }
}
